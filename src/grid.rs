//! Packs a stream of images into a terminal-cell grid.
//!
//! Symbol mode prints one logical grid row per chunk, with per-column
//! alignment, optional ellipsized labels, and a blank separator line.
//! Pixel modes place one image per chunk using cursor save/restore and
//! column advances so native payloads flow into adjacent cells.

use crate::canvas::config::{CanvasConfig, PixelMode};
use crate::canvas::Canvas;
use crate::pipeline::MediaLoader;
use crate::term::info::TermInfo;
use crate::term::seq::Seq;
use crate::term::Term;
use crate::util::{calc_canvas_geometry, label_line, Align, Tuck};

const MAX_COLS: usize = 1024;

/// Cell pixel size assumed when the terminal did not report one.
const FALLBACK_CELL_PX: (usize, usize) = (10, 20);

struct FormattedItem {
    rows: Vec<Vec<u8>>,
    width: usize,
    height: usize,
    path: String,
}

pub struct GridLayout {
    view_width: i32,
    view_height: i32,
    n_cols: i32,
    n_rows: i32,
    canvas_config: CanvasConfig,
    term_info: TermInfo,
    halign: Align,
    valign: Align,
    tuck: Tuck,
    paths: Vec<String>,
    next_item: usize,
    finished_push: bool,
    finished_chunks: bool,
    print_labels: bool,
    use_unicode: bool,
}

impl GridLayout {
    pub fn new(canvas_config: CanvasConfig, term_info: TermInfo) -> Self {
        let mut grid = Self {
            view_width: 0,
            view_height: 0,
            n_cols: -1,
            n_rows: -1,
            canvas_config,
            term_info,
            halign: Align::Start,
            valign: Align::Start,
            tuck: Tuck::Fit,
            paths: Vec::new(),
            next_item: 0,
            finished_push: false,
            finished_chunks: false,
            print_labels: false,
            use_unicode: true,
        };
        grid.update_geometry();
        grid
    }

    pub fn set_view_size(&mut self, width: i32, height: i32) {
        self.view_width = width;
        self.view_height = height;
        self.update_geometry();
    }

    pub fn set_grid_size(&mut self, n_cols: i32, n_rows: i32) {
        self.n_cols = n_cols.min(MAX_COLS as i32);
        self.n_rows = n_rows;
        self.update_geometry();
    }

    pub fn set_align(&mut self, halign: Align, valign: Align) {
        self.halign = halign;
        self.valign = valign;
    }

    pub fn set_tuck(&mut self, tuck: Tuck) {
        self.tuck = tuck;
    }

    pub fn set_print_labels(&mut self, print_labels: bool) {
        self.print_labels = print_labels;
    }

    pub fn set_use_unicode(&mut self, use_unicode: bool) {
        self.use_unicode = use_unicode;
    }

    pub fn push_path(&mut self, path: &str) {
        debug_assert!(!self.finished_push);
        self.paths.push(path.to_string());
    }

    pub fn item_geometry(&self) -> (usize, usize) {
        self.canvas_config.geometry()
    }

    fn cell_px(&self) -> (usize, usize) {
        match self.canvas_config.cell_size_px() {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            _ => FALLBACK_CELL_PX,
        }
    }

    /// Splits the view into tiles. A missing dimension is derived so
    /// tiles come out approximately square in pixel space.
    fn update_geometry(&mut self) {
        let (cell_w_px, cell_h_px) = self.cell_px();
        let view_width = self.view_width.max(1);
        let view_height = self.view_height.max(1);
        let mut n_cols = self.n_cols;
        let mut n_rows = self.n_rows;

        if n_cols < 1 && n_rows < 1 {
            n_cols = 1;
            n_rows = 1;
        }

        let (item_width, item_height);
        if n_cols < 1 {
            item_height = (view_height / n_rows - 1).max(1);
            item_width = (item_height as usize * cell_h_px / cell_w_px).max(1) as i32;
        } else if n_rows < 1 {
            item_width = (view_width / n_cols - 1).max(1);
            item_height = (item_width as usize * cell_w_px / cell_h_px).max(1) as i32;
        } else {
            item_width = (view_width / n_cols - 1).max(1);
            item_height = (view_height / n_rows - 1).max(1);
        }

        if self.n_cols < 1 {
            self.n_cols = (view_width / (item_width + 1))
                .clamp(1, MAX_COLS as i32);
        }

        let _ = self
            .canvas_config
            .set_geometry(item_width.max(1), item_height.max(1));
    }

    fn format_item(&self, path: &str) -> Option<FormattedItem> {
        let loader = match MediaLoader::open(std::path::Path::new(path)) {
            Ok(loader) => loader,
            Err(err) => {
                log::warn!("{}", err);
                return None;
            }
        };
        let (pixel_type, pixels, src_w, src_h, rowstride) = loader.first_frame().data();

        let (col_w, row_h) = self.canvas_config.geometry();
        let (mut item_w, mut item_h) = (col_w as i32, row_h as i32);
        if self.tuck != Tuck::Stretch {
            let (cw, ch) = self.cell_px();
            let font_ratio = cw as f32 / ch as f32;
            calc_canvas_geometry(
                src_w,
                src_h,
                &mut item_w,
                &mut item_h,
                font_ratio,
                self.tuck == Tuck::Fit,
                false,
            );
            item_w = item_w.min(col_w as i32);
            item_h = item_h.min(row_h as i32);
        }

        let mut config = self.canvas_config.clone();
        config.set_geometry(item_w.max(1), item_h.max(1)).ok()?;
        let mut canvas = Canvas::new(&config);
        if let Err(err) = canvas.draw_all_pixels(pixel_type, pixels, src_w, src_h, rowstride) {
            log::warn!("{}: {}", path, err);
            return None;
        }

        Some(FormattedItem {
            rows: canvas.print_rows(&self.term_info),
            width: item_w.max(1) as usize,
            height: item_h.max(1) as usize,
            path: path.to_string(),
        })
    }

    /// Produces the next chunk of output (one grid row in symbol mode,
    /// one image otherwise). Returns false when all paths are consumed.
    pub fn print_chunk(&mut self, term: &Term) -> bool {
        if !self.finished_push {
            self.finished_push = true;
            self.update_geometry();
        }

        if self.canvas_config.pixel_mode() == PixelMode::Symbols {
            self.print_symbol_chunk(term)
        } else {
            self.print_image_chunk(term)
        }
    }

    fn print_symbol_chunk(&mut self, term: &Term) -> bool {
        if self.finished_chunks {
            return false;
        }

        let (col_w, row_h) = self.canvas_config.geometry();
        let mut items: Vec<FormattedItem> = Vec::new();
        while items.len() < self.n_cols.max(1) as usize && self.next_item < self.paths.len() {
            let path = self.paths[self.next_item].clone();
            self.next_item += 1;
            if let Some(item) = self.format_item(&path) {
                items.push(item);
            }
        }

        if items.is_empty() {
            self.finished_chunks = true;
            return false;
        }

        let spaces = |n: usize| b" ".repeat(n);
        for r in 0..row_h {
            for (j, item) in items.iter().enumerate() {
                if j > 0 {
                    term.write(b" ");
                }

                let top_pad = match self.valign {
                    Align::Start => 0,
                    Align::Center => (row_h - item.height) / 2,
                    Align::End => row_h - item.height,
                };
                if r >= top_pad && r < top_pad + item.height {
                    let left_pad = match self.halign {
                        Align::Start => 0,
                        Align::Center => (col_w - item.width) / 2,
                        Align::End => col_w - item.width,
                    };
                    term.write(&spaces(left_pad));
                    term.write(&item.rows[r - top_pad]);
                    term.write(&spaces(col_w - item.width - left_pad));
                } else {
                    term.write(&spaces(col_w));
                }
            }
            term.write(b"\n");
        }

        if self.print_labels {
            for (j, item) in items.iter().enumerate() {
                if j > 0 {
                    term.write(b" ");
                }
                term.write(
                    label_line(&item.path, self.halign, col_w, self.use_unicode).as_bytes(),
                );
            }
            term.write(b"\n");
        }

        term.write(b"\n");
        true
    }

    /// Pixel-protocol placement: reserve rows by scrolling, then position
    /// each image with saved cursor state and column advances.
    fn print_image_chunk(&mut self, term: &Term) -> bool {
        if self.finished_chunks {
            return false;
        }

        let (col_w, row_h) = self.canvas_config.geometry();

        let mut item = None;
        while self.next_item < self.paths.len() && item.is_none() {
            let path = self.paths[self.next_item].clone();
            self.next_item += 1;
            item = self.format_item(&path);
        }

        let n_cols = self.n_cols.max(1) as usize;
        let item_index = self.next_item.saturating_sub(1);

        // End the previous grid row before starting a new one or
        // finishing up.
        if item_index != 0 && (item_index % n_cols == 0 || item.is_none()) {
            let label_rows = if self.print_labels { 1 } else { 0 };
            for _ in 0..row_h + label_rows + 1 {
                term.print_seq(Seq::CursorDownScroll, &[]);
            }
            term.write(b"\r");
        }

        let Some(item) = item else {
            self.finished_chunks = true;
            return false;
        };

        if item_index % n_cols == 0 {
            // Reserve vertical space, scrolling as needed.
            for _ in 0..row_h + 1 {
                term.print_seq(Seq::CursorDownScroll, &[]);
            }
            term.print_seq(Seq::CursorUp, &[row_h as u32 + 1]);
        }

        term.print_seq(Seq::SaveCursorPos, &[]);
        for row in &item.rows {
            term.write(row);
        }

        if self.print_labels {
            term.print_seq(Seq::RestoreCursorPos, &[]);
            term.print_seq(Seq::CursorDown, &[row_h as u32]);
            term.write(label_line(&item.path, self.halign, col_w, self.use_unicode).as_bytes());
        }

        term.print_seq(Seq::RestoreCursorPos, &[]);
        term.print_seq(Seq::CursorRight, &[col_w as u32 + 1]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::db::TermDb;
    use std::os::fd::RawFd;

    fn write_png(dir: &std::path::Path, name: &str, w: u32, h: u32) -> String {
        let path = dir.join(name);
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([200, 100, 50, 255]));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn pipe_term() -> (Term, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let term = Term::new(Some(TermDb::get_default().fallback_info()), -1, fds[1], -1);
        (term, fds[0])
    }

    fn drain(fd: RawFd) -> Vec<u8> {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        let mut out = Vec::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        out
    }

    fn grid_with(view: (i32, i32), cols: i32, rows: i32) -> GridLayout {
        let mut grid = GridLayout::new(
            CanvasConfig::new(),
            TermDb::get_default().fallback_info(),
        );
        grid.set_view_size(view.0, view.1);
        grid.set_grid_size(cols, rows);
        grid
    }

    #[test]
    fn explicit_grid_divides_view() {
        let grid = grid_with((81, 50), 4, 2);
        assert_eq!(grid.item_geometry(), (19, 24));
    }

    #[test]
    fn auto_rows_make_square_tiles() {
        let grid = grid_with((80, 100), 4, -1);
        // 19 cells wide at 10 px each → 190 px; at 20 px per row that is
        // 9 rows.
        assert_eq!(grid.item_geometry(), (19, 9));
    }

    #[test]
    fn auto_cols_derived_from_rows() {
        let grid = grid_with((200, 40), -1, 2);
        let (w, h) = grid.item_geometry();
        assert_eq!(h, 19);
        assert_eq!(w, 38);
    }

    #[test]
    fn unset_grid_is_single_tile() {
        let grid = grid_with((50, 30), -1, -1);
        let (w, h) = grid.item_geometry();
        assert_eq!((w, h), (49, 29));
    }

    #[test]
    fn symbol_chunks_cover_all_paths_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (term, rd) = pipe_term();

        let mut grid = grid_with((40, 40), 2, 2);
        grid.set_print_labels(true);
        grid.set_use_unicode(false);
        for name in ["aa.png", "bb.png", "cc.png"] {
            grid.push_path(&write_png(dir.path(), name, 16, 16));
        }

        // Two chunks of up to two images, then exhaustion. Drain between
        // chunks so the pipe never fills.
        let mut out = Vec::new();
        assert!(grid.print_chunk(&term));
        term.flush();
        out.extend(drain(rd));
        assert!(grid.print_chunk(&term));
        term.flush();
        out.extend(drain(rd));
        assert!(!grid.print_chunk(&term));
        assert!(!grid.print_chunk(&term));
        term.flush();
        out.extend(drain(rd));

        let text = String::from_utf8_lossy(&out);
        let a = text.find("aa.png").expect("label aa");
        let b = text.find("bb.png").expect("label bb");
        let c = text.find("cc.png").expect("label cc");
        assert!(a < c && b < c);

        drop(term);
        unsafe {
            libc::close(rd);
        }
    }

    #[test]
    fn failed_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (term, rd) = pipe_term();

        let mut grid = grid_with((40, 20), 2, 1);
        grid.set_print_labels(true);
        grid.set_use_unicode(false);
        grid.push_path("/nonexistent/missing.png");
        grid.push_path(&write_png(dir.path(), "ok.png", 8, 8));

        assert!(grid.print_chunk(&term));
        assert!(!grid.print_chunk(&term));
        term.flush();

        let text = String::from_utf8_lossy(&drain(rd)).into_owned();
        assert!(text.contains("ok.png"));
        assert!(!text.contains("missing"));

        drop(term);
        unsafe {
            libc::close(rd);
        }
    }

    #[test]
    fn chunk_line_count_matches_row_height() {
        let dir = tempfile::tempdir().unwrap();
        let (term, rd) = pipe_term();

        let mut grid = grid_with((30, 30), 2, 1);
        grid.push_path(&write_png(dir.path(), "one.png", 8, 8));
        assert!(grid.print_chunk(&term));
        term.flush();

        let out = drain(rd);
        let (_, row_h) = grid.item_geometry();
        let newlines = out.iter().filter(|&&b| b == b'\n').count();
        // Image rows plus the blank separator line.
        assert_eq!(newlines, row_h + 1);

        drop(term);
        unsafe {
            libc::close(rd);
        }
    }
}
