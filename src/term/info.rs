//! A single terminal's capability record.

use std::sync::Arc;

use crate::canvas::config::{CanvasMode, PixelMode};
use crate::error::Result;
use crate::symbols::{tag, Tags};
use crate::term::seq::{CompiledSeq, ParseResult, Seq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Passthrough {
    #[default]
    None,
    Screen,
    Tmux,
}

fn canvas_mode_bit(mode: CanvasMode) -> u32 {
    1 << match mode {
        CanvasMode::Truecolor => 0,
        CanvasMode::Indexed256 => 1,
        CanvasMode::Indexed240 => 2,
        CanvasMode::Indexed16 => 3,
        CanvasMode::Indexed16_8 => 4,
        CanvasMode::Indexed8 => 5,
        CanvasMode::FgBgBgFg => 6,
        CanvasMode::FgBg => 7,
    }
}

fn pixel_mode_bit(mode: PixelMode) -> u32 {
    1 << match mode {
        PixelMode::Symbols => 0,
        PixelMode::Sixels => 1,
        PixelMode::Kitty => 2,
        PixelMode::Iterm2 => 3,
    }
}

/// Canvas modes ordered best first, used by `best_canvas_mode`.
const CANVAS_MODE_PREFERENCE: [CanvasMode; 8] = [
    CanvasMode::Truecolor,
    CanvasMode::Indexed256,
    CanvasMode::Indexed240,
    CanvasMode::Indexed16,
    CanvasMode::Indexed16_8,
    CanvasMode::Indexed8,
    CanvasMode::FgBgBgFg,
    CanvasMode::FgBg,
];

const PIXEL_MODE_PREFERENCE: [PixelMode; 4] = [
    PixelMode::Kitty,
    PixelMode::Sixels,
    PixelMode::Iterm2,
    PixelMode::Symbols,
];

#[derive(Debug, Clone)]
pub struct TermInfo {
    name: String,
    seqs: Vec<Option<CompiledSeq>>,
    /// Per-slot chaining control: when false, a missing sequence does NOT
    /// fall through to the inner link ("terminal-here").
    inherit: Vec<bool>,
    inner: Option<Arc<TermInfo>>,
    canvas_modes: u32,
    pixel_modes: u32,
    passthrough: Passthrough,
    pixel_passthrough_needed: [bool; 4],
    safe_symbol_tags: Tags,
}

impl Default for TermInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl TermInfo {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            seqs: vec![None; Seq::COUNT],
            inherit: vec![true; Seq::COUNT],
            inner: None,
            canvas_modes: canvas_mode_bit(CanvasMode::FgBg),
            pixel_modes: pixel_mode_bit(PixelMode::Symbols),
            passthrough: Passthrough::None,
            pixel_passthrough_needed: [false; 4],
            safe_symbol_tags: tag::ASCII,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    // ── Sequences ───────────────────────────────────────────────────────

    /// Installs (or clears) a sequence template.
    pub fn set_seq(&mut self, seq: Seq, template: Option<&[u8]>) -> Result<()> {
        let slot = &mut self.seqs[seq.index()];
        match template {
            Some(t) => *slot = Some(CompiledSeq::compile(seq, t)?),
            None => *slot = None,
        }
        Ok(())
    }

    /// The compiled template for `seq`, following the chain when this
    /// record does not provide it and the slot allows inheritance.
    pub fn get_seq(&self, seq: Seq) -> Option<&CompiledSeq> {
        let i = seq.index();
        if let Some(compiled) = &self.seqs[i] {
            return Some(compiled);
        }
        if self.inherit[i] {
            if let Some(inner) = &self.inner {
                return inner.get_seq(seq);
            }
        }
        None
    }

    pub fn have_seq(&self, seq: Seq) -> bool {
        self.get_seq(seq).is_some()
    }

    pub fn inherit_seq(&self, seq: Seq) -> bool {
        self.inherit[seq.index()]
    }

    pub fn set_inherit_seq(&mut self, seq: Seq, inherit: bool) {
        self.inherit[seq.index()] = inherit;
    }

    /// Formats `seq` with `args`; `None` when the sequence is absent.
    pub fn emit_seq(&self, seq: Seq, args: &[u32]) -> Option<Vec<u8>> {
        let compiled = self.get_seq(seq)?;
        match compiled.emit(args) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("emit {:?}: {}", seq, err);
                None
            }
        }
    }

    /// Parses `input` against `seq`. Absent sequences fail.
    pub fn parse_seq(&self, seq: Seq, input: &[u8]) -> (ParseResult, Vec<i32>, usize) {
        match self.get_seq(seq) {
            Some(compiled) => compiled.parse(input),
            None => (ParseResult::Failure, Vec::new(), 0),
        }
    }

    /// Copies sequences present in `source` into slots this record leaves
    /// empty.
    pub fn supplement(&mut self, source: &TermInfo) {
        for seq in Seq::ALL {
            let i = seq.index();
            if self.seqs[i].is_none() {
                if let Some(compiled) = source.get_seq(seq) {
                    self.seqs[i] = Some(compiled.clone());
                }
            }
        }
    }

    // ── Modes and passthrough ───────────────────────────────────────────

    pub fn add_canvas_mode(&mut self, mode: CanvasMode) {
        self.canvas_modes |= canvas_mode_bit(mode);
    }

    pub fn is_canvas_mode_supported(&self, mode: CanvasMode) -> bool {
        self.canvas_modes & canvas_mode_bit(mode) != 0
    }

    pub fn best_canvas_mode(&self) -> CanvasMode {
        CANVAS_MODE_PREFERENCE
            .into_iter()
            .find(|&m| self.is_canvas_mode_supported(m))
            .unwrap_or(CanvasMode::FgBg)
    }

    pub fn add_pixel_mode(&mut self, mode: PixelMode) {
        self.pixel_modes |= pixel_mode_bit(mode);
    }

    pub fn is_pixel_mode_supported(&self, mode: PixelMode) -> bool {
        self.pixel_modes & pixel_mode_bit(mode) != 0
    }

    pub fn best_pixel_mode(&self) -> PixelMode {
        PIXEL_MODE_PREFERENCE
            .into_iter()
            .find(|&m| self.is_pixel_mode_supported(m))
            .unwrap_or(PixelMode::Symbols)
    }

    pub fn passthrough_type(&self) -> Passthrough {
        self.passthrough
    }

    pub fn set_passthrough_type(&mut self, passthrough: Passthrough) {
        self.passthrough = passthrough;
    }

    pub fn is_pixel_passthrough_needed(&self, mode: PixelMode) -> bool {
        self.pixel_passthrough_needed[pixel_mode_bit(mode).trailing_zeros() as usize]
    }

    pub fn set_pixel_passthrough_needed(&mut self, mode: PixelMode, needed: bool) {
        self.pixel_passthrough_needed[pixel_mode_bit(mode).trailing_zeros() as usize] = needed;
    }

    pub fn safe_symbol_tags(&self) -> Tags {
        self.safe_symbol_tags
    }

    pub fn set_safe_symbol_tags(&mut self, tags: Tags) {
        self.safe_symbol_tags = tags;
    }

    // ── Chaining ────────────────────────────────────────────────────────

    /// Composes two records for multiplexer passthrough: lookups try
    /// `outer` first and fall through to `inner` per-slot.
    pub fn chain(outer: &TermInfo, inner: &TermInfo) -> TermInfo {
        let mut chained = outer.clone();
        chained.inner = Some(Arc::new(inner.clone()));
        // The view through a multiplexer is constrained by both ends.
        chained.canvas_modes = outer.canvas_modes & inner.canvas_modes
            | canvas_mode_bit(CanvasMode::FgBg);
        chained.pixel_modes = outer.pixel_modes & inner.pixel_modes
            | pixel_mode_bit(PixelMode::Symbols);
        chained.safe_symbol_tags = outer.safe_symbol_tags & inner.safe_symbol_tags;
        chained
    }

    /// Wraps `payload` in this terminal's passthrough guards (§6.2-style
    /// screen/tmux encapsulation). Returns the payload untouched when no
    /// passthrough is configured.
    pub fn wrap_passthrough(&self, payload: &[u8]) -> Vec<u8> {
        match self.passthrough {
            Passthrough::None => payload.to_vec(),
            Passthrough::Screen => {
                // ESC P <payload> ESC \ in bounded chunks.
                let mut out = Vec::with_capacity(payload.len() + 8);
                out.extend_from_slice(b"\x1bP");
                out.extend_from_slice(payload);
                out.extend_from_slice(b"\x1b\\");
                out
            }
            Passthrough::Tmux => {
                let mut out = Vec::with_capacity(payload.len() + 16);
                out.extend_from_slice(b"\x1bPtmux;");
                for &b in payload {
                    if b == 0x1b {
                        out.push(0x1b);
                    }
                    out.push(b);
                }
                out.extend_from_slice(b"\x1b\\");
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with(seqs: &[(Seq, &str)]) -> TermInfo {
        let mut info = TermInfo::new();
        for (seq, template) in seqs {
            info.set_seq(*seq, Some(template.as_bytes())).unwrap();
        }
        info
    }

    #[test]
    fn emit_parse_round_trip_through_info() {
        let info = info_with(&[
            (Seq::CursorUp, "\x1b[%1A"),
            (Seq::CursorToPos, "\x1b[%1;%2H"),
        ]);
        let bytes = info.emit_seq(Seq::CursorToPos, &[3, 9]).unwrap();
        let (result, args, consumed) = info.parse_seq(Seq::CursorToPos, &bytes);
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![3, 9]);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn absent_seq_emits_nothing_and_fails_parse() {
        let info = TermInfo::new();
        assert!(info.emit_seq(Seq::CursorUp, &[1]).is_none());
        let (result, ..) = info.parse_seq(Seq::CursorUp, b"\x1b[1A");
        assert_eq!(result, ParseResult::Failure);
    }

    #[test]
    fn chain_falls_through_unless_terminal_here() {
        let inner = info_with(&[(Seq::CursorUp, "\x1b[%1A"), (Seq::CursorDown, "\x1b[%1B")]);
        let mut outer = info_with(&[(Seq::CursorUp, "UP%1")]);
        outer.set_inherit_seq(Seq::CursorDown, false);

        let chained = TermInfo::chain(&outer, &inner);
        // Outer's own template wins.
        assert_eq!(chained.emit_seq(Seq::CursorUp, &[2]).unwrap(), b"UP2");
        // Terminal-here slot blocks fallthrough.
        assert!(chained.emit_seq(Seq::CursorDown, &[2]).is_none());
        // Unmarked missing slots fall through.
        let inner2 = info_with(&[(Seq::CursorLeft, "\x1b[%1D")]);
        let chained2 = TermInfo::chain(&outer, &inner2);
        assert_eq!(
            chained2.emit_seq(Seq::CursorLeft, &[7]).unwrap(),
            b"\x1b[7D"
        );
    }

    #[test]
    fn supplement_fills_only_missing() {
        let mut dst = info_with(&[(Seq::CursorUp, "UP%1")]);
        let src = info_with(&[(Seq::CursorUp, "up-%1"), (Seq::BeginSixels, "\x1bPq")]);
        dst.supplement(&src);
        assert_eq!(dst.emit_seq(Seq::CursorUp, &[1]).unwrap(), b"UP1");
        assert_eq!(dst.emit_seq(Seq::BeginSixels, &[]).unwrap(), b"\x1bPq");
    }

    #[test]
    fn best_canvas_mode_prefers_truecolor() {
        let mut info = TermInfo::new();
        assert_eq!(info.best_canvas_mode(), CanvasMode::FgBg);
        info.add_canvas_mode(CanvasMode::Indexed256);
        assert_eq!(info.best_canvas_mode(), CanvasMode::Indexed256);
        info.add_canvas_mode(CanvasMode::Truecolor);
        assert_eq!(info.best_canvas_mode(), CanvasMode::Truecolor);
    }

    #[test]
    fn screen_passthrough_wraps() {
        let mut info = TermInfo::new();
        info.set_passthrough_type(Passthrough::Screen);
        assert_eq!(info.wrap_passthrough(b"abc"), b"\x1bPabc\x1b\\");
    }

    #[test]
    fn tmux_passthrough_doubles_escapes() {
        let mut info = TermInfo::new();
        info.set_passthrough_type(Passthrough::Tmux);
        assert_eq!(
            info.wrap_passthrough(b"\x1b[31m"),
            b"\x1bPtmux;\x1b\x1b[31m\x1b\\"
        );
    }
}
