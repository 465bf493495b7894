//! Concurrent FD streams: a reader and a writer, each with one worker
//! thread, a byte fifo, and a mutex/condvar/wakeup trio.
//!
//! The worker owns the blocking syscalls; the foreground side only ever
//! touches the fifo under the lock. A self-pipe wakeup breaks the
//! worker's poll() promptly at shutdown, and its `signal` is the one
//! operation safe to call from a signal handler.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::fifo::ByteFifo;

const READ_BUF_MAX: usize = 4096;
const WRITE_BUF_MAX: usize = 4096;

/// Reader backpressure limit: the worker stops pulling from the fd when
/// this much is buffered.
const READER_FIFO_MAX: usize = 32 * 1024;

/// Writer buffer bound; `write` blocks when the fifo is this full.
const WRITER_FIFO_MAX: usize = 1 << 20;

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

pub fn fd_is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

// ── Wakeup ──────────────────────────────────────────────────────────────

/// Self-pipe wakeup. `signal` performs a single write and is
/// async-signal-safe.
pub struct Wakeup {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Wakeup {
    pub fn new() -> std::io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        for fd in fds {
            set_nonblocking(fd);
            unsafe {
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    pub fn signal(&self) {
        unsafe {
            libc::write(self.write_fd, b"w".as_ptr() as *const libc::c_void, 1);
        }
    }

    fn poll_fd(&self) -> RawFd {
        self.read_fd
    }

    fn drain(&self) {
        let mut buf = [0u8; 16];
        loop {
            let n = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for Wakeup {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// What the poll+read step observed.
enum IoStep {
    Data(usize),
    Empty,
    Closed,
    Woken,
}

fn poll_read(fd: RawFd, wakeup: &Wakeup, buf: &mut [u8]) -> IoStep {
    let mut fds = [
        libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: wakeup.poll_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return IoStep::Empty;
        }
        return IoStep::Closed;
    }

    if fds[1].revents != 0 {
        wakeup.drain();
        return IoStep::Woken;
    }

    if fds[0].revents & libc::POLLIN != 0 {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        match n {
            0 => IoStep::Closed,
            n if n > 0 => IoStep::Data(n as usize),
            _ => {
                let err = std::io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EAGAIN) | Some(libc::EINTR) => IoStep::Empty,
                    _ => IoStep::Closed,
                }
            }
        }
    } else if fds[0].revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
        IoStep::Closed
    } else {
        IoStep::Empty
    }
}

/// Write with retry on interrupts and short writes; waits for a
/// nonblocking pipe to drain rather than spinning.
fn write_all(fd: RawFd, mut data: &[u8]) -> bool {
    while !data.is_empty() {
        let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if n > 0 {
            data = &data[n as usize..];
            continue;
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) => {
                let mut pfd = libc::pollfd {
                    fd,
                    events: libc::POLLOUT,
                    revents: 0,
                };
                let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
                if rc < 0 || pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

// ── StreamReader ────────────────────────────────────────────────────────

struct ReaderState {
    fifo: ByteFifo,
    token_restart: u64,
    eof_seen: bool,
    shutdown_reqd: bool,
    shutdown_done: bool,
}

struct ReaderShared {
    fd: RawFd,
    state: Mutex<ReaderState>,
    cond: Condvar,
    wakeup: Wakeup,
}

pub struct StreamReader {
    shared: Arc<ReaderShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    token_separator: Vec<u8>,
    is_console: bool,
}

impl StreamReader {
    pub fn from_fd(fd: RawFd) -> Self {
        Self::from_fd_full(fd, b"\n")
    }

    /// `token_separator` delimits the units returned by `read_token`.
    pub fn from_fd_full(fd: RawFd, token_separator: &[u8]) -> Self {
        let separator = if token_separator.is_empty() {
            b"\n".to_vec()
        } else {
            token_separator.to_vec()
        };
        Self {
            shared: Arc::new(ReaderShared {
                fd,
                state: Mutex::new(ReaderState {
                    fifo: ByteFifo::new(),
                    token_restart: 0,
                    eof_seen: false,
                    shutdown_reqd: false,
                    shutdown_done: false,
                }),
                cond: Condvar::new(),
                wakeup: Wakeup::new().expect("wakeup pipe"),
            }),
            thread: Mutex::new(None),
            token_separator: separator,
            is_console: fd_is_tty(fd),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.shared.fd
    }

    pub fn is_console(&self) -> bool {
        self.is_console
    }

    fn ensure_thread(&self) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        set_nonblocking(self.shared.fd);

        let shared = Arc::clone(&self.shared);
        *slot = Some(std::thread::spawn(move || reader_thread(shared)));
    }

    /// Pops up to `out.len()` buffered bytes; never blocks.
    pub fn read(&self, out: &mut [u8]) -> usize {
        self.ensure_thread();
        let mut state = self.shared.state.lock();
        let n = state.fifo.pop(out);
        if state.fifo.len() <= READER_FIFO_MAX {
            self.shared.cond.notify_all();
        }
        n
    }

    /// Extracts the next separator-delimited token, if one is complete.
    /// At EOF the unterminated tail is returned as the final token.
    /// Tokens longer than `max_len` are skipped and reported as an error.
    pub fn read_token(&self, max_len: usize) -> Result<Option<Vec<u8>>> {
        self.ensure_thread();
        let mut state = self.shared.state.lock();

        let mut restart = state.token_restart;
        let token = state
            .fifo
            .split_next(&self.token_separator, &mut restart)
            .or_else(|| {
                let at_eof = state.eof_seen || state.shutdown_done;
                if at_eof && !state.fifo.is_empty() {
                    let len = state.fifo.len();
                    Some(state.fifo.pop_vec(len))
                } else {
                    None
                }
            });
        state.token_restart = restart.max(state.fifo.position());

        if state.fifo.len() <= READER_FIFO_MAX {
            self.shared.cond.notify_all();
        }
        drop(state);

        match token {
            Some(t) if t.len() > max_len => Err(Error::OversizedToken(max_len)),
            other => Ok(other),
        }
    }

    /// Blocks until new data, EOF, shutdown, or timeout.
    pub fn wait(&self, timeout_ms: Option<u64>) {
        match timeout_ms {
            Some(ms) => {
                self.wait_until(Instant::now() + Duration::from_millis(ms));
            }
            None => {
                self.ensure_thread();
                let mut state = self.shared.state.lock();
                if state.shutdown_done || state.eof_seen {
                    return;
                }
                self.shared.cond.wait(&mut state);
            }
        }
    }

    /// Returns false if the deadline passed without a signal.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        if deadline <= Instant::now() {
            return false;
        }
        self.ensure_thread();
        let mut state = self.shared.state.lock();
        if state.shutdown_done || state.eof_seen {
            return true;
        }
        !self
            .shared
            .cond
            .wait_until(&mut state, deadline)
            .timed_out()
    }

    pub fn is_eof(&self) -> bool {
        let state = self.shared.state.lock();
        state.fifo.is_empty() && (state.eof_seen || state.shutdown_done)
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown_reqd = true;
            self.shared.wakeup.signal();
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn reader_thread(shared: Arc<ReaderShared>) {
    let mut buf = [0u8; READ_BUF_MAX];

    loop {
        let step = poll_read(shared.fd, &shared.wakeup, &mut buf);

        let mut state = shared.state.lock();
        match step {
            IoStep::Closed | IoStep::Woken => {
                state.eof_seen = true;
            }
            IoStep::Data(n) => {
                state.fifo.push(&buf[..n]);
                shared.cond.notify_all();
            }
            IoStep::Empty => {}
        }

        if state.eof_seen || state.shutdown_reqd {
            state.shutdown_done = true;
            shared.cond.notify_all();
            return;
        }

        while state.fifo.len() > READER_FIFO_MAX && !state.shutdown_reqd {
            shared.cond.wait(&mut state);
        }
        if state.shutdown_reqd {
            state.shutdown_done = true;
            shared.cond.notify_all();
            return;
        }
    }
}

// ── StreamWriter ────────────────────────────────────────────────────────

struct WriterState {
    fifo: ByteFifo,
    buf_max: usize,
    drained: bool,
    io_error: bool,
    shutdown_reqd: bool,
    shutdown_done: bool,
}

struct WriterShared {
    fd: RawFd,
    state: Mutex<WriterState>,
    cond: Condvar,
    wakeup: Wakeup,
}

pub struct StreamWriter {
    shared: Arc<WriterShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    is_console: bool,
}

impl StreamWriter {
    pub fn from_fd(fd: RawFd) -> Self {
        Self {
            shared: Arc::new(WriterShared {
                fd,
                state: Mutex::new(WriterState {
                    fifo: ByteFifo::new(),
                    buf_max: WRITER_FIFO_MAX,
                    drained: true,
                    io_error: false,
                    shutdown_reqd: false,
                    shutdown_done: false,
                }),
                cond: Condvar::new(),
                wakeup: Wakeup::new().expect("wakeup pipe"),
            }),
            thread: Mutex::new(None),
            is_console: fd_is_tty(fd),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.shared.fd
    }

    pub fn is_console(&self) -> bool {
        self.is_console
    }

    pub fn buffer_max(&self) -> usize {
        self.shared.state.lock().buf_max
    }

    pub fn set_buffer_max(&self, buf_max: usize) {
        if buf_max > 0 {
            self.shared.state.lock().buf_max = buf_max;
        }
    }

    fn ensure_thread(&self) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *slot = Some(std::thread::spawn(move || writer_thread(shared)));
    }

    /// Queues `data` for the worker, blocking when the fifo is full.
    pub fn write(&self, mut data: &[u8]) {
        self.ensure_thread();

        while !data.is_empty() {
            let mut state = self.shared.state.lock();

            loop {
                let queued = state.fifo.len();
                if queued == 0 || queued + data.len() <= state.buf_max {
                    break;
                }
                if state.shutdown_done || state.io_error {
                    return;
                }
                self.shared.cond.wait(&mut state);
            }

            let n = data.len().min(state.buf_max);
            state.drained = false;
            state.fifo.push(&data[..n]);
            data = &data[n..];

            self.shared.cond.notify_all();
        }
    }

    /// Blocks until everything queued has left the process (or the
    /// stream failed). Returns false on a failed stream.
    pub fn flush(&self) -> bool {
        self.ensure_thread();
        let mut state = self.shared.state.lock();
        while !state.shutdown_done && !state.drained && !state.io_error {
            self.shared.cond.wait(&mut state);
        }
        !state.io_error
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown_reqd = true;
            self.shared.wakeup.signal();
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn writer_thread(shared: Arc<WriterShared>) {
    let mut buf = [0u8; WRITE_BUF_MAX];

    loop {
        let chunk_len;
        {
            let mut state = shared.state.lock();

            if state.io_error || state.shutdown_reqd {
                state.shutdown_done = true;
                shared.cond.notify_all();
                return;
            }

            if state.fifo.is_empty() {
                state.drained = true;
                shared.cond.notify_all();
            }

            loop {
                let n = state.fifo.pop(&mut buf);
                if n > 0 {
                    chunk_len = n;
                    break;
                }
                if state.shutdown_reqd {
                    state.shutdown_done = true;
                    shared.cond.notify_all();
                    return;
                }
                shared.cond.wait(&mut state);
            }

            shared.cond.notify_all();
        }

        if !write_all(shared.fd, &buf[..chunk_len]) {
            shared.state.lock().io_error = true;
        }
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

    fn write_fd(fd: RawFd, data: &[u8]) {
        assert!(write_all(fd, data));
    }

    fn close_fd(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    fn read_fd_to_end(fd: RawFd) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        out
    }

    // ── Reader ──────────────────────────────────────────────────────────

    #[test]
    fn reader_delivers_bytes_in_order() {
        let (rd, wr) = pipe();
        let reader = StreamReader::from_fd(rd);

        write_fd(wr, b"hello ");
        write_fd(wr, b"stream");
        close_fd(wr);

        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while got.len() < 12 && Instant::now() < deadline {
            let mut buf = [0u8; 64];
            let n = reader.read(&mut buf);
            if n == 0 {
                reader.wait(Some(50));
            } else {
                got.extend_from_slice(&buf[..n]);
            }
        }
        assert_eq!(got, b"hello stream");

        // Drain any remaining state, then EOF must hold.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !reader.is_eof() && Instant::now() < deadline {
            reader.wait(Some(10));
        }
        assert!(reader.is_eof());
        drop(reader);
        close_fd(rd);
    }

    #[test]
    fn reader_tokenizes_with_trailing_remainder() {
        let (rd, wr) = pipe();
        let reader = StreamReader::from_fd_full(rd, b"\n");

        write_fd(wr, b"alpha\nbeta\ngamma");
        close_fd(wr);

        let mut tokens: Vec<Vec<u8>> = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while tokens.len() < 3 && Instant::now() < deadline {
            match reader.read_token(4096).unwrap() {
                Some(t) => tokens.push(t),
                None => {
                    if reader.is_eof() {
                        break;
                    }
                    reader.wait(Some(20));
                }
            }
        }
        assert_eq!(tokens, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
        drop(reader);
        close_fd(rd);
    }

    #[test]
    fn reader_rejects_oversized_tokens() {
        let (rd, wr) = pipe();
        let reader = StreamReader::from_fd_full(rd, b"\n");

        write_fd(wr, b"0123456789\nok\n");
        close_fd(wr);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut oversize_seen = false;
        let mut ok_seen = false;
        while Instant::now() < deadline && !(oversize_seen && ok_seen) {
            match reader.read_token(4) {
                Err(Error::OversizedToken(4)) => oversize_seen = true,
                Ok(Some(t)) => {
                    assert_eq!(t, b"ok");
                    ok_seen = true;
                }
                Ok(None) => {
                    if reader.is_eof() {
                        break;
                    }
                    reader.wait(Some(20));
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(oversize_seen, "oversized token must be reported");
        assert!(ok_seen, "following token must still come through");
        drop(reader);
        close_fd(rd);
    }

    #[test]
    fn reader_drop_joins_promptly() {
        let (rd, wr) = pipe();
        let reader = StreamReader::from_fd(rd);
        // Start the worker, then drop while it sits in poll().
        let mut buf = [0u8; 8];
        let _ = reader.read(&mut buf);
        drop(reader);
        close_fd(wr);
        close_fd(rd);
    }

    #[test]
    fn wait_until_times_out() {
        let (rd, wr) = pipe();
        let reader = StreamReader::from_fd(rd);
        let woke = reader.wait_until(Instant::now() + Duration::from_millis(30));
        assert!(!woke);
        drop(reader);
        close_fd(wr);
        close_fd(rd);
    }

    // ── Writer ──────────────────────────────────────────────────────────

    #[test]
    fn writer_round_trips_bytes() {
        let (rd, wr) = pipe();
        let writer = StreamWriter::from_fd(wr);

        writer.write(b"first ");
        writer.write(b"second");
        assert!(writer.flush());
        drop(writer);
        close_fd(wr);

        assert_eq!(read_fd_to_end(rd), b"first second");
        close_fd(rd);
    }

    #[test]
    fn writer_flush_waits_for_drain() {
        let (rd, wr) = pipe();
        let writer = StreamWriter::from_fd(wr);

        let payload = vec![7u8; 200_000];
        let reader_thread = std::thread::spawn(move || read_fd_to_end(rd));

        writer.write(&payload);
        assert!(writer.flush());
        drop(writer);
        close_fd(wr);

        let got = reader_thread.join().unwrap();
        assert_eq!(got.len(), payload.len());
        close_fd(rd);
    }
}
