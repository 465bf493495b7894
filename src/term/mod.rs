//! Terminal composition: capability record, event parser, and the
//! concurrent reader/writer streams, plus synchronous probing.

pub mod db;
pub mod info;
pub mod parser;
pub mod seq;
pub mod stream;

use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::color::pack_rgb;
use crate::term::db::TermDb;
use crate::term::info::TermInfo;
use crate::term::parser::{Event, EventParser};
use crate::term::seq::Seq;
use crate::term::stream::{StreamReader, StreamWriter};

/// Probed pixel sizes above this are treated as garbage.
const PIXEL_EXTENT_MAX: i32 = 8192 * 3;
const CELL_EXTENT_PX_MAX: i32 = 8192;

const READ_BUF_MAX: usize = 4096;

fn fd_is_valid(fd: RawFd) -> bool {
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFL) } >= 0
}

pub struct Term {
    term_info: Arc<TermInfo>,
    parser: EventParser,
    reader: Option<StreamReader>,
    writer: Option<StreamWriter>,
    err_writer: Option<StreamWriter>,

    width_cells: i32,
    height_cells: i32,
    width_px: i32,
    height_px: i32,
    cell_width_px: i32,
    cell_height_px: i32,

    /// Packed RGB, or −1 when unknown.
    default_fg_rgb: i32,
    default_bg_rgb: i32,

    have_tty_size: bool,
    interactive: bool,
    in_eof_seen: bool,
    probe_attempted: bool,
    probe_success: bool,
    probe_found_sixel: bool,

    /// Events consumed by a synchronous probe, replayed to the caller.
    event_queue: VecDeque<Event>,
}

impl Term {
    /// Builds a terminal from a capability record (detected from the
    /// environment when absent) and up to three file descriptors. The
    /// descriptors stay owned by the caller; invalid ones are ignored.
    pub fn new(
        term_info: Option<TermInfo>,
        in_fd: RawFd,
        out_fd: RawFd,
        err_fd: RawFd,
    ) -> Self {
        let info = Arc::new(
            term_info.unwrap_or_else(|| TermDb::get_default().detect_from_env()),
        );

        let reader = fd_is_valid(in_fd).then(|| StreamReader::from_fd(in_fd));
        let writer = fd_is_valid(out_fd).then(|| StreamWriter::from_fd(out_fd));
        let err_writer = fd_is_valid(err_fd).then(|| StreamWriter::from_fd(err_fd));

        let interactive = reader.as_ref().is_some_and(|r| r.is_console())
            && writer.as_ref().is_some_and(|w| w.is_console());

        let mut term = Self {
            parser: EventParser::new(Arc::clone(&info)),
            term_info: info,
            reader,
            writer,
            err_writer,
            width_cells: -1,
            height_cells: -1,
            width_px: -1,
            height_px: -1,
            cell_width_px: -1,
            cell_height_px: -1,
            default_fg_rgb: -1,
            default_bg_rgb: -1,
            have_tty_size: false,
            interactive,
            in_eof_seen: false,
            probe_attempted: false,
            probe_success: false,
            probe_found_sixel: false,
            event_queue: VecDeque::new(),
        };
        term.refresh_tty_size();
        term
    }

    /// The process-default terminal on stdio.
    pub fn get_default() -> &'static Mutex<Term> {
        use std::sync::OnceLock;
        static TERM: OnceLock<Mutex<Term>> = OnceLock::new();
        TERM.get_or_init(|| Mutex::new(Term::new(None, 0, 1, 2)))
    }

    pub fn term_info(&self) -> &Arc<TermInfo> {
        &self.term_info
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn buffer_max(&self) -> Option<usize> {
        self.writer.as_ref().map(|w| w.buffer_max())
    }

    pub fn set_buffer_max(&self, max: usize) {
        if let Some(w) = &self.writer {
            w.set_buffer_max(max);
        }
    }

    // ── Output ──────────────────────────────────────────────────────────

    pub fn write(&self, data: &[u8]) {
        if let Some(w) = &self.writer {
            w.write(data);
        }
    }

    pub fn print(&self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Emits a sequence with arguments; returns the byte count written,
    /// or `None` when the terminal does not define the sequence.
    pub fn print_seq(&self, seq: Seq, args: &[u32]) -> Option<usize> {
        let bytes = self.term_info.emit_seq(seq, args)?;
        self.write(&bytes);
        Some(bytes.len())
    }

    pub fn flush(&self) -> bool {
        self.writer.as_ref().map(|w| w.flush()).unwrap_or(false)
    }

    pub fn write_err(&self, data: &[u8]) {
        if let Some(w) = &self.err_writer {
            w.write(data);
        }
    }

    pub fn print_err(&self, text: &str) {
        self.write_err(text.as_bytes());
    }

    // ── Input ───────────────────────────────────────────────────────────

    /// Pops the next input event, waiting up to `timeout_ms` (forever
    /// when `None`). Size, default-color, device-attribute, and EOF
    /// replies update this terminal's state on the way through.
    pub fn read_event(&mut self, timeout_ms: Option<u64>) -> Option<Event> {
        self.reader.as_ref()?;

        if let Some(event) = self.event_queue.pop_front() {
            return Some(event);
        }
        if self.in_eof_seen {
            return None;
        }

        let event = self.pull_event(timeout_ms)?;
        self.handle_event(&event);
        Some(event)
    }

    fn pull_event(&mut self, timeout_ms: Option<u64>) -> Option<Event> {
        if let Some(event) = self.parser.pop_event() {
            return Some(event);
        }

        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        loop {
            let reader = self.reader.as_ref()?;
            let mut buf = [0u8; READ_BUF_MAX];
            let n = reader.read(&mut buf);
            if n > 0 {
                self.parser.push_data(&buf[..n]);
            }
            if reader.is_eof() {
                self.parser.push_eof();
            }
            if let Some(event) = self.parser.pop_event() {
                return Some(event);
            }

            let reader = self.reader.as_ref()?;
            match deadline {
                None => reader.wait(None),
                Some(d) => {
                    if !reader.wait_until(d) {
                        return None;
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Eof => self.in_eof_seen = true,
            Event::Seq { seq, args } => match seq {
                Seq::DefaultFg => {
                    if let [r, g, b] = args[..] {
                        self.default_fg_rgb = packed_or_unknown(r, g, b);
                    }
                }
                Seq::DefaultBg => {
                    if let [r, g, b] = args[..] {
                        self.default_bg_rgb = packed_or_unknown(r, g, b);
                    }
                }
                Seq::TextAreaSizeCells => {
                    if let [h, w] = args[..] {
                        if h > 0 && w > 0 {
                            self.width_cells = w;
                            self.height_cells = h;
                        }
                    }
                }
                Seq::TextAreaSizePx => {
                    if let [h, w] = args[..] {
                        if h > 0 && h < PIXEL_EXTENT_MAX && w > 0 && w < PIXEL_EXTENT_MAX {
                            self.width_px = w;
                            self.height_px = h;
                        }
                    }
                }
                Seq::CellSizePx => {
                    if let [h, w] = args[..] {
                        if h > 0 && h < CELL_EXTENT_PX_MAX && w > 0 && w < CELL_EXTENT_PX_MAX {
                            self.cell_width_px = w;
                            self.cell_height_px = h;
                        }
                    }
                }
                Seq::PrimaryDeviceAttributes => {
                    if args.iter().any(|&a| a == 4) {
                        self.probe_found_sixel = true;
                    }
                    self.probe_success = true;
                    self.apply_probe_results();
                }
                _ => {}
            },
            Event::Unichar(_) => {}
        }
    }

    fn apply_probe_results(&mut self) {
        if !self.probe_success {
            return;
        }

        if self.probe_found_sixel && !self.term_info.have_seq(Seq::BeginSixels) {
            let mut supplemented = (*self.term_info).clone();
            db::add_sixel_seqs(&mut supplemented);
            let info = Arc::new(supplemented);
            self.term_info = Arc::clone(&info);
            self.parser.set_term_info(info);
        }

        if self.width_cells > 0
            && self.height_cells > 0
            && self.width_px > 0
            && self.height_px > 0
        {
            self.cell_width_px = self.width_px / self.width_cells;
            self.cell_height_px = self.height_px / self.height_cells;
        }
    }

    // ── Probing and sizes ───────────────────────────────────────────────

    /// Queries default colors, sizes, and device attributes, consuming
    /// replies until the DA response or the timeout. All consumed events
    /// are queued for later `read_event` calls. Returns whether the DA
    /// reply arrived.
    pub fn sync_probe(&mut self, timeout_ms: u64) -> bool {
        if self.probe_success {
            return true;
        }
        if !self.interactive {
            return false;
        }

        let saved_termios = self.reader.as_ref().and_then(|r| enable_raw_mode(r.fd()));

        self.print_seq(Seq::QueryDefaultFg, &[]);
        self.print_seq(Seq::QueryDefaultBg, &[]);
        self.print_seq(Seq::QueryTextAreaSizeCells, &[]);
        self.print_seq(Seq::QueryTextAreaSizePx, &[]);
        self.print_seq(Seq::QueryCellSizePx, &[]);
        self.print_seq(Seq::QueryPrimaryDeviceAttributes, &[]);
        self.flush();
        self.probe_attempted = true;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remain = (deadline - now).as_millis() as u64;
            let Some(event) = self.pull_event(Some(remain.max(1))) else {
                break;
            };
            self.handle_event(&event);
            self.event_queue.push_back(event);
            if self.probe_success || self.in_eof_seen {
                break;
            }
        }

        if let (Some(reader), Some(termios)) = (&self.reader, saved_termios) {
            restore_termios(reader.fd(), &termios);
        }

        self.probe_success
    }

    pub fn probe_attempted(&self) -> bool {
        self.probe_attempted
    }

    pub fn probe_succeeded(&self) -> bool {
        self.probe_success
    }

    pub fn probe_found_sixel(&self) -> bool {
        self.probe_found_sixel
    }

    pub fn get_size_cells(&mut self) -> (i32, i32) {
        if !self.have_tty_size {
            self.refresh_tty_size();
        }
        (self.width_cells, self.height_cells)
    }

    pub fn get_size_px(&mut self) -> (i32, i32) {
        if !self.have_tty_size {
            self.refresh_tty_size();
        }
        (self.width_px, self.height_px)
    }

    pub fn cell_size_px(&self) -> (i32, i32) {
        (self.cell_width_px, self.cell_height_px)
    }

    /// To be called from a SIGWINCH handler's deferred path: invalidates
    /// the cached size so the next query re-probes.
    pub fn notify_size_changed(&mut self) {
        self.refresh_tty_size();
    }

    pub fn default_fg_color(&self) -> i32 {
        self.default_fg_rgb
    }

    pub fn default_bg_color(&self) -> i32 {
        self.default_bg_rgb
    }

    fn refresh_tty_size(&mut self) {
        self.width_cells = -1;
        self.height_cells = -1;
        self.width_px = -1;
        self.height_px = -1;

        let fds = [
            self.writer.as_ref().map(|w| w.fd()),
            self.err_writer.as_ref().map(|w| w.fd()),
            self.reader.as_ref().map(|r| r.fd()),
        ];
        for fd in fds.into_iter().flatten() {
            let mut ws = libc::winsize {
                ws_row: 0,
                ws_col: 0,
                ws_xpixel: 0,
                ws_ypixel: 0,
            };
            if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) } == 0 {
                self.width_cells = ws.ws_col as i32;
                self.height_cells = ws.ws_row as i32;
                self.width_px = ws.ws_xpixel as i32;
                self.height_px = ws.ws_ypixel as i32;
                break;
            }
        }

        if self.width_cells <= 0 {
            self.width_cells = -1;
        }
        if self.height_cells <= 2 {
            self.height_cells = -1;
        }
        if self.width_px <= 0
            || self.height_px <= 0
            || self.width_px > PIXEL_EXTENT_MAX
            || self.height_px > PIXEL_EXTENT_MAX
        {
            self.width_px = -1;
            self.height_px = -1;
        }

        self.have_tty_size = true;
    }
}

fn packed_or_unknown(r: i32, g: i32, b: i32) -> i32 {
    if (0..=255).contains(&r) && (0..=255).contains(&g) && (0..=255).contains(&b) {
        pack_rgb(r as u8, g as u8, b as u8) as i32
    } else {
        -1
    }
}

/// Turns off canonical mode and echo so probe replies arrive without user
/// interaction; returns the saved settings when anything changed.
fn enable_raw_mode(fd: RawFd) -> Option<libc::termios> {
    unsafe {
        let mut saved: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut saved) != 0 {
            return None;
        }
        let mut raw = saved;
        raw.c_lflag &= !(libc::ECHO | libc::ICANON);
        if raw.c_lflag == saved.c_lflag {
            return None;
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
            return None;
        }
        Some(saved)
    }
}

fn restore_termios(fd: RawFd, saved: &libc::termios) {
    unsafe {
        libc::tcsetattr(fd, libc::TCSANOW, saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn close_fd(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    fn pipe_term() -> (Term, RawFd, RawFd) {
        // in: we hold the write end; out: we hold the read end.
        let (in_rd, in_wr) = pipe();
        let (out_rd, out_wr) = pipe();
        let info = TermDb::get_default().fallback_info();
        let term = Term::new(Some(info), in_rd, out_wr, -1);
        (term, in_wr, out_rd)
    }

    #[test]
    fn read_event_times_out_on_silence() {
        let (mut term, in_wr, out_rd) = pipe_term();
        let start = Instant::now();
        let event = term.read_event(Some(80));
        assert!(event.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70));
        assert!(elapsed < Duration::from_millis(2000));
        drop(term);
        close_fd(in_wr);
        close_fd(out_rd);
    }

    #[test]
    fn read_event_decodes_replies_and_updates_state() {
        let (mut term, in_wr, out_rd) = pipe_term();

        let payload = b"\x1b]10;rgb:ffff/0000/8080\x1b\\\x1b[8;50;120t";
        unsafe {
            libc::write(
                in_wr,
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
            );
        }

        let e1 = term.read_event(Some(2000)).unwrap();
        assert_eq!(e1.seq(), Some(Seq::DefaultFg));
        assert_eq!(term.default_fg_color(), 0xff0080);

        let e2 = term.read_event(Some(2000)).unwrap();
        assert_eq!(e2.seq(), Some(Seq::TextAreaSizeCells));

        drop(term);
        close_fd(in_wr);
        close_fd(out_rd);
    }

    #[test]
    fn da_reply_marks_probe_success_and_supplements_sixels() {
        let (mut term, in_wr, out_rd) = pipe_term();
        assert!(!term.term_info().have_seq(Seq::BeginSixels));

        let payload = b"\x1b[?62;4c";
        unsafe {
            libc::write(
                in_wr,
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
            );
        }

        let e = term.read_event(Some(2000)).unwrap();
        assert_eq!(e.seq(), Some(Seq::PrimaryDeviceAttributes));
        assert!(term.probe_succeeded());
        assert!(term.probe_found_sixel());
        assert!(term.term_info().have_seq(Seq::BeginSixels));

        drop(term);
        close_fd(in_wr);
        close_fd(out_rd);
    }

    #[test]
    fn sync_probe_on_pipe_fails_fast_without_losing_events() {
        let (mut term, in_wr, out_rd) = pipe_term();

        let start = Instant::now();
        let ok = term.sync_probe(100);
        assert!(!ok);
        assert!(!term.probe_succeeded());
        // Pipes are not interactive, so this fails immediately; the spec
        // budget is ~110 ms.
        assert!(start.elapsed() < Duration::from_millis(110));

        // Events arriving later are still delivered.
        let payload = b"\x1b[1A";
        unsafe {
            libc::write(
                in_wr,
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
            );
        }
        let e = term.read_event(Some(2000)).unwrap();
        assert_eq!(e.seq(), Some(Seq::CursorUp));

        drop(term);
        close_fd(in_wr);
        close_fd(out_rd);
    }

    #[test]
    fn write_reaches_fd_after_flush() {
        let (term, in_wr, out_rd) = pipe_term();
        term.write(b"hello");
        term.print_seq(Seq::CursorUp, &[3]);
        assert!(term.flush());

        let mut buf = [0u8; 64];
        let n = unsafe {
            libc::read(out_rd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };
        assert_eq!(&buf[..n as usize], b"hello\x1b[3A");

        drop(term);
        close_fd(in_wr);
        close_fd(out_rd);
    }

    #[test]
    fn eof_event_is_terminal() {
        let (mut term, in_wr, out_rd) = pipe_term();
        close_fd(in_wr);

        let e = term.read_event(Some(2000)).unwrap();
        assert_eq!(e, Event::Eof);
        assert!(term.read_event(Some(10)).is_none());

        drop(term);
        close_fd(out_rd);
    }
}
