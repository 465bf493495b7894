//! Canvas serialization: SGR state tracking and glyph emission.

use crate::canvas::config::{opt, CanvasMode};
use crate::canvas::{Canvas, Cell, WIDE_RIGHT};
use crate::term::info::TermInfo;
use crate::term::seq::Seq;

impl Canvas {
    /// Serializes the canvas for `term_info`, one newline-terminated line
    /// per cell row. Output is deterministic for a given canvas and
    /// terminal.
    pub fn print(&self, term_info: &TermInfo) -> Vec<u8> {
        let mut out = Vec::new();
        for row in self.print_rows(term_info) {
            out.extend_from_slice(&row);
            out.push(b'\n');
        }
        out
    }

    /// Like `print`, but returns each row separately with no trailing
    /// newline, for callers that place rows at absolute positions.
    pub fn print_rows(&self, term_info: &TermInfo) -> Vec<Vec<u8>> {
        let mut rows = Vec::with_capacity(self.height());
        for y in 0..self.height() {
            rows.push(self.print_row(term_info, y));
        }
        rows
    }

    fn print_row(&self, term_info: &TermInfo, y: usize) -> Vec<u8> {
        let reuse = self.config().optimizations() & opt::REUSE_ATTRIBUTES != 0;
        let repeat = self.config().optimizations() & opt::REPEAT_CELLS != 0
            && term_info.have_seq(Seq::RepeatChar);
        let width = self.width();
        let cells = self.cells();
        let row = &cells[y * width..(y + 1) * width];

        let mut out = Vec::new();
        let mut prev_attrs: Option<Vec<u8>> = None;
        let mut active = false;
        let mut utf8 = [0u8; 4];

        let mut x = 0;
        while x < width {
            let cell = &row[x];
            if cell.ch == WIDE_RIGHT {
                x += 1;
                continue;
            }

            let attrs = self.attr_bytes(term_info, cell);
            let unchanged = reuse && prev_attrs.as_ref() == Some(&attrs);
            if !unchanged {
                // Attribute bytes assume a clean slate; reset first when
                // anything is active or about to become active.
                if active || !attrs.is_empty() {
                    if let Some(reset) = term_info.emit_seq(Seq::ResetAttributes, &[]) {
                        out.extend_from_slice(&reset);
                    }
                }
                out.extend_from_slice(&attrs);
                active = !attrs.is_empty();
                prev_attrs = Some(attrs);
            }

            out.extend_from_slice(cell.ch.encode_utf8(&mut utf8).as_bytes());

            if repeat && !cell.ch.is_ascii_control() {
                let mut run = 1;
                while x + run < width && row[x + run] == *cell {
                    run += 1;
                }
                if run >= 4 {
                    if let Some(rep) =
                        term_info.emit_seq(Seq::RepeatChar, &[(run - 1) as u32])
                    {
                        out.extend_from_slice(&rep);
                        x += run;
                        continue;
                    }
                }
            }
            x += 1;
        }

        if active {
            if let Some(reset) = term_info.emit_seq(Seq::ResetAttributes, &[]) {
                out.extend_from_slice(&reset);
            }
        }
        out
    }

    /// The SGR bytes that put the terminal into this cell's state,
    /// assuming attributes were just reset.
    fn attr_bytes(&self, term_info: &TermInfo, cell: &Cell) -> Vec<u8> {
        let mut out = Vec::new();
        let emit = |out: &mut Vec<u8>, seq: Seq, args: &[u32]| {
            if let Some(bytes) = term_info.emit_seq(seq, args) {
                out.extend_from_slice(&bytes);
            }
        };

        if cell.inverted {
            emit(&mut out, Seq::InvertColors, &[]);
        }

        let fg_set = cell.fg_raw >= 0;
        let bg_set = cell.bg_raw >= 0;

        match self.config().canvas_mode() {
            CanvasMode::FgBg | CanvasMode::FgBgBgFg => {}
            CanvasMode::Truecolor => {
                let fg = cell.fg_rgb;
                let bg = cell.bg_rgb;
                if fg_set && bg_set {
                    if term_info.have_seq(Seq::SetColorFgbgDirect) {
                        emit(
                            &mut out,
                            Seq::SetColorFgbgDirect,
                            &[
                                fg[0] as u32,
                                fg[1] as u32,
                                fg[2] as u32,
                                bg[0] as u32,
                                bg[1] as u32,
                                bg[2] as u32,
                            ],
                        );
                    } else {
                        emit(
                            &mut out,
                            Seq::SetColorFgDirect,
                            &[fg[0] as u32, fg[1] as u32, fg[2] as u32],
                        );
                        emit(
                            &mut out,
                            Seq::SetColorBgDirect,
                            &[bg[0] as u32, bg[1] as u32, bg[2] as u32],
                        );
                    }
                } else if fg_set {
                    emit(
                        &mut out,
                        Seq::SetColorFgDirect,
                        &[fg[0] as u32, fg[1] as u32, fg[2] as u32],
                    );
                } else if bg_set {
                    emit(
                        &mut out,
                        Seq::SetColorBgDirect,
                        &[bg[0] as u32, bg[1] as u32, bg[2] as u32],
                    );
                }
            }
            CanvasMode::Indexed256 | CanvasMode::Indexed240 => {
                if fg_set && bg_set && term_info.have_seq(Seq::SetColorFgbg256) {
                    emit(
                        &mut out,
                        Seq::SetColorFgbg256,
                        &[cell.fg_raw as u32, cell.bg_raw as u32],
                    );
                } else {
                    if fg_set {
                        emit(&mut out, Seq::SetColorFg256, &[cell.fg_raw as u32]);
                    }
                    if bg_set {
                        emit(&mut out, Seq::SetColorBg256, &[cell.bg_raw as u32]);
                    }
                }
            }
            CanvasMode::Indexed16 | CanvasMode::Indexed16_8 | CanvasMode::Indexed8 => {
                if fg_set && bg_set && term_info.have_seq(Seq::SetColorFgbg16) {
                    emit(
                        &mut out,
                        Seq::SetColorFgbg16,
                        &[cell.fg_raw as u32, cell.bg_raw as u32],
                    );
                } else {
                    if fg_set {
                        emit(&mut out, Seq::SetColorFg16, &[cell.fg_raw as u32]);
                    }
                    if bg_set {
                        emit(&mut out, Seq::SetColorBg16, &[cell.bg_raw as u32]);
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::config::{CanvasConfig, PixelType};
    use crate::color::pack_rgb;
    use crate::term::db::TermDb;
    use crate::term::parser::EventParser;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn direct_info() -> TermInfo {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), "foot".to_string());
        env.insert("LANG".to_string(), "en_US.UTF-8".to_string());
        TermDb::new().detect(&env)
    }

    fn canvas(mode: CanvasMode, w: i32, h: i32) -> Canvas {
        let mut config = CanvasConfig::new();
        config.set_canvas_mode(mode);
        config.set_geometry(w, h).unwrap();
        Canvas::new(&config)
    }

    #[test]
    fn truecolor_cell_emits_fgbg_and_reset() {
        let mut c = canvas(CanvasMode::Truecolor, 1, 1);
        c.set_char_at(0, 0, 'A');
        c.set_raw_colors_at(0, 0, pack_rgb(255, 0, 0) as i32, pack_rgb(0, 0, 255) as i32);

        let out = c.print(&direct_info());
        assert_eq!(
            out,
            b"\x1b[0m\x1b[38;2;255;0;0;48;2;0;0;255mA\x1b[0m\n".to_vec()
        );
    }

    #[test]
    fn reuse_attributes_suppresses_repeats() {
        let info = direct_info();
        let mut config = CanvasConfig::new();
        config.set_geometry(3, 1).unwrap();
        config.set_optimizations(opt::REUSE_ATTRIBUTES);
        let mut c = Canvas::new(&config);
        for x in 0..3 {
            c.set_char_at(x, 0, 'z');
            c.set_raw_colors_at(x, 0, pack_rgb(1, 2, 3) as i32, pack_rgb(4, 5, 6) as i32);
        }

        let out = c.print(&info);
        let text = String::from_utf8_lossy(&out);
        // One SGR for the whole run, three glyphs, one trailing reset.
        assert_eq!(text.matches("38;2;1;2;3").count(), 1);
        assert_eq!(text.matches('z').count(), 3);
        assert!(text.ends_with("\u{1b}[0m\n"));
    }

    #[test]
    fn repeat_cells_uses_rep_sequence() {
        let info = direct_info();
        let mut config = CanvasConfig::new();
        config.set_geometry(6, 1).unwrap();
        config.set_optimizations(opt::ALL);
        let mut c = Canvas::new(&config);
        for x in 0..6 {
            c.set_char_at(x, 0, 'q');
            c.set_raw_colors_at(x, 0, pack_rgb(9, 9, 9) as i32, pack_rgb(0, 0, 0) as i32);
        }

        let out = c.print(&info);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("q\u{1b}[5b"), "got {:?}", text);
        assert_eq!(text.matches('q').count(), 1);
    }

    #[test]
    fn short_runs_are_emitted_literally() {
        let info = direct_info();
        let mut config = CanvasConfig::new();
        config.set_geometry(3, 1).unwrap();
        config.set_optimizations(opt::ALL);
        let mut c = Canvas::new(&config);
        for x in 0..3 {
            c.set_char_at(x, 0, 'r');
            c.set_raw_colors_at(x, 0, pack_rgb(9, 9, 9) as i32, pack_rgb(0, 0, 0) as i32);
        }

        let out = c.print(&info);
        let text = String::from_utf8_lossy(&out);
        assert_eq!(text.matches('r').count(), 3);
        assert!(!text.contains("b"), "no REP for short runs: {:?}", text);
    }

    #[test]
    fn fgbg_mode_emits_bare_glyphs() {
        let mut config = CanvasConfig::new();
        config.set_canvas_mode(CanvasMode::FgBg);
        config.set_geometry(4, 1).unwrap();
        let mut c = Canvas::new(&config);
        c.draw_all_pixels(PixelType::Rgba8Unassociated, &[255, 255, 255, 255], 1, 1, 4)
            .unwrap();

        let out = c.print(&direct_info());
        // No SGR at all: glyphs and the newline only.
        assert!(!out.contains(&0x1b));
    }

    #[test]
    fn inverted_cell_wraps_with_reset() {
        let info = direct_info();
        let mut config = CanvasConfig::new();
        config.set_canvas_mode(CanvasMode::FgBgBgFg);
        config.set_geometry(1, 1).unwrap();
        let mut c = Canvas::new(&config);
        c.set_char_at(0, 0, '█');
        // Force the inverted flag the way the matcher would.
        let (fg, bg) = c.get_raw_colors_at(0, 0).unwrap();
        c.set_raw_colors_at(0, 0, fg, bg);
        c.cells_mut()[0].inverted = true;

        let out = c.print(&info);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("\u{1b}[7m"));
        assert!(text.ends_with("\u{1b}[0m\n"));
    }

    #[test]
    fn print_rows_omit_newlines() {
        let mut c = canvas(CanvasMode::Truecolor, 2, 3);
        c.set_char_at(0, 0, 'x');
        let rows = c.print_rows(&direct_info());
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!(!row.contains(&b'\n'));
        }
    }

    #[test]
    fn printed_sequences_parse_back() {
        let info = direct_info();
        let mut c = canvas(CanvasMode::Truecolor, 2, 1);
        c.set_char_at(0, 0, 'a');
        c.set_raw_colors_at(0, 0, pack_rgb(10, 20, 30) as i32, pack_rgb(40, 50, 60) as i32);
        c.set_char_at(1, 0, 'b');
        c.set_raw_colors_at(1, 0, pack_rgb(70, 80, 90) as i32, pack_rgb(1, 2, 3) as i32);

        let out = c.print(&info);
        let mut parser = EventParser::new(Arc::new(info));
        parser.push_data(&out);
        parser.push_eof();

        let mut glyphs = Vec::new();
        let mut fg_seqs = Vec::new();
        while let Some(e) = parser.pop_event() {
            match e {
                crate::term::parser::Event::Unichar(ch) if ch != '\n' => glyphs.push(ch),
                crate::term::parser::Event::Seq { seq, args } => {
                    if seq == Seq::SetColorFgbgDirect {
                        fg_seqs.push(args);
                    }
                }
                _ => {}
            }
        }
        assert_eq!(glyphs, vec!['a', 'b']);
        assert_eq!(
            fg_seqs,
            vec![vec![10, 20, 30, 40, 50, 60], vec![70, 80, 90, 1, 2, 3]]
        );
    }

    #[test]
    fn print_is_deterministic() {
        let mut config = CanvasConfig::new();
        config.set_geometry(8, 4).unwrap();
        let mut c = Canvas::new(&config);
        let mut pixels = Vec::new();
        for i in 0..64u32 {
            pixels.extend_from_slice(&[(i * 3) as u8, (i * 5) as u8, (i * 7) as u8, 255]);
        }
        c.draw_all_pixels(PixelType::Rgba8Unassociated, &pixels, 8, 8, 32)
            .unwrap();

        let info = direct_info();
        assert_eq!(c.print(&info), c.print(&info));
    }
}
