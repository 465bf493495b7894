//! Named control sequences with typed arguments: templates, emit, parse.
//!
//! A template is a byte string of at most `SEQ_LENGTH_MAX` formatted bytes
//! containing numbered placeholders `%1..%n`. Emitting substitutes
//! rendered arguments; parsing runs the template in reverse and extracts
//! them. Sequences that carry a reply list (primary device attributes)
//! use a single varargs placeholder.

use crate::error::{Error, Result};

/// Longest formatted sequence we will ever produce, including worst-case
/// argument widths.
pub const SEQ_LENGTH_MAX: usize = 96;

/// Maximum number of arguments plus one for the sentinel slot.
pub const SEQ_ARGS_MAX: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seq {
    ResetTerminalSoft,
    ResetAttributes,
    InvertColors,
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    CursorToTopLeft,
    CursorToPos,
    CursorDownScroll,
    SaveCursorPos,
    RestoreCursorPos,
    SetColorFgDirect,
    SetColorBgDirect,
    SetColorFgbgDirect,
    SetColorFg256,
    SetColorBg256,
    SetColorFgbg256,
    SetColorFg16,
    SetColorBg16,
    SetColorFgbg16,
    ResetColorFgbg,
    RepeatChar,
    QueryPrimaryDeviceAttributes,
    PrimaryDeviceAttributes,
    QueryDefaultFg,
    DefaultFg,
    QueryDefaultBg,
    DefaultBg,
    QueryTextAreaSizeCells,
    TextAreaSizeCells,
    QueryTextAreaSizePx,
    TextAreaSizePx,
    QueryCellSizePx,
    CellSizePx,
    BeginSixels,
    EndSixels,
    EnableSixelScrolling,
    DisableSixelScrolling,
    SetSixelAdvanceDown,
    SetSixelAdvanceRight,
    BeginScreenPassthrough,
    EndScreenPassthrough,
    BeginTmuxPassthrough,
    EndTmuxPassthrough,
}

impl Seq {
    pub const ALL: [Seq; 45] = [
        Seq::ResetTerminalSoft,
        Seq::ResetAttributes,
        Seq::InvertColors,
        Seq::CursorUp,
        Seq::CursorDown,
        Seq::CursorLeft,
        Seq::CursorRight,
        Seq::CursorToTopLeft,
        Seq::CursorToPos,
        Seq::CursorDownScroll,
        Seq::SaveCursorPos,
        Seq::RestoreCursorPos,
        Seq::SetColorFgDirect,
        Seq::SetColorBgDirect,
        Seq::SetColorFgbgDirect,
        Seq::SetColorFg256,
        Seq::SetColorBg256,
        Seq::SetColorFgbg256,
        Seq::SetColorFg16,
        Seq::SetColorBg16,
        Seq::SetColorFgbg16,
        Seq::ResetColorFgbg,
        Seq::RepeatChar,
        Seq::QueryPrimaryDeviceAttributes,
        Seq::PrimaryDeviceAttributes,
        Seq::QueryDefaultFg,
        Seq::DefaultFg,
        Seq::QueryDefaultBg,
        Seq::DefaultBg,
        Seq::QueryTextAreaSizeCells,
        Seq::TextAreaSizeCells,
        Seq::QueryTextAreaSizePx,
        Seq::TextAreaSizePx,
        Seq::QueryCellSizePx,
        Seq::CellSizePx,
        Seq::BeginSixels,
        Seq::EndSixels,
        Seq::EnableSixelScrolling,
        Seq::DisableSixelScrolling,
        Seq::SetSixelAdvanceDown,
        Seq::SetSixelAdvanceRight,
        Seq::BeginScreenPassthrough,
        Seq::EndScreenPassthrough,
        Seq::BeginTmuxPassthrough,
        Seq::EndTmuxPassthrough,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).expect("seq in table")
    }

    /// Declared argument count; `None` means a variable-length list.
    pub fn n_args(self) -> Option<usize> {
        match self {
            Seq::PrimaryDeviceAttributes => None,
            Seq::CursorUp
            | Seq::CursorDown
            | Seq::CursorLeft
            | Seq::CursorRight
            | Seq::SetColorFg256
            | Seq::SetColorBg256
            | Seq::SetColorFg16
            | Seq::SetColorBg16
            | Seq::RepeatChar => Some(1),
            Seq::CursorToPos
            | Seq::SetColorFgbg256
            | Seq::SetColorFgbg16
            | Seq::TextAreaSizeCells
            | Seq::TextAreaSizePx
            | Seq::CellSizePx => Some(2),
            Seq::SetColorFgDirect | Seq::SetColorBgDirect | Seq::DefaultFg | Seq::DefaultBg => {
                Some(3)
            }
            Seq::SetColorFgbgDirect => Some(6),
            _ => Some(0),
        }
    }

    /// How arguments are rendered and parsed.
    pub fn arg_proc(self) -> ArgProc {
        match self {
            Seq::SetColorFg16 => ArgProc::Aix16Fg,
            Seq::SetColorBg16 => ArgProc::Aix16Bg,
            Seq::SetColorFgbg16 => ArgProc::Aix16FgBg,
            Seq::DefaultFg | Seq::DefaultBg => ArgProc::Hex16,
            _ => ArgProc::Decimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgProc {
    /// Plain decimal integer.
    Decimal,
    /// aixterm 16-color foreground: 0..7 → 30..37, 8..15 → 90..97.
    Aix16Fg,
    /// aixterm 16-color background: 0..7 → 40..47, 8..15 → 100..107.
    Aix16Bg,
    /// First argument fg-mapped, second bg-mapped.
    Aix16FgBg,
    /// Hex color component, two or four digits; the top 8 bits are kept.
    Hex16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    Success,
    Failure,
    Again,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Lit(Vec<u8>),
    /// 0-based argument index.
    Arg(usize),
    /// Semicolon-separated integer list (varargs sequences).
    ArgList,
}

/// A template compiled for one sequence slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSeq {
    seq: Seq,
    parts: Vec<Part>,
    source: Vec<u8>,
}

impl CompiledSeq {
    /// Compiles `template`, validating placeholder indices and the
    /// worst-case formatted length.
    pub fn compile(seq: Seq, template: &[u8]) -> Result<Self> {
        let n_args = seq.n_args();
        let mut parts: Vec<Part> = Vec::new();
        let mut lit: Vec<u8> = Vec::new();

        let mut i = 0;
        while i < template.len() {
            let b = template[i];
            if b == b'%' {
                if i + 1 >= template.len() {
                    return Err(Error::BadSeqTemplate("dangling '%'".into()));
                }
                let spec = template[i + 1];
                if spec == b'%' {
                    lit.push(b'%');
                    i += 2;
                    continue;
                }
                if !lit.is_empty() {
                    parts.push(Part::Lit(std::mem::take(&mut lit)));
                }
                if spec == b'v' {
                    if n_args.is_some() {
                        return Err(Error::BadSeqTemplate(
                            "varargs placeholder in fixed-arity sequence".into(),
                        ));
                    }
                    parts.push(Part::ArgList);
                    i += 2;
                    continue;
                }
                // Placeholder number: one or two digits.
                let mut num = 0usize;
                let mut digits = 0;
                while i + 1 + digits < template.len()
                    && template[i + 1 + digits].is_ascii_digit()
                    && digits < 2
                {
                    num = num * 10 + (template[i + 1 + digits] - b'0') as usize;
                    digits += 1;
                }
                if digits == 0 {
                    return Err(Error::BadSeqTemplate(format!(
                        "malformed placeholder '%{}'",
                        spec as char
                    )));
                }
                let max = n_args.unwrap_or(0);
                if num < 1 || num > max || num > SEQ_ARGS_MAX - 1 {
                    return Err(Error::BadSeqTemplate(format!(
                        "argument index {} out of range (sequence takes {})",
                        num, max
                    )));
                }
                parts.push(Part::Arg(num - 1));
                i += 1 + digits;
            } else {
                lit.push(b);
                i += 1;
            }
        }
        if !lit.is_empty() {
            parts.push(Part::Lit(lit));
        }

        // Worst-case render length: literals plus ten digits per argument
        // slot. Varargs lists are parsed rather than formatted in anger,
        // so they do not count against the fixed budget.
        let worst: usize = parts
            .iter()
            .map(|p| match p {
                Part::Lit(l) => l.len(),
                Part::Arg(_) => 10,
                Part::ArgList => 0,
            })
            .sum();
        if worst > SEQ_LENGTH_MAX {
            return Err(Error::SeqTooLong {
                limit: SEQ_LENGTH_MAX,
            });
        }

        Ok(Self {
            seq,
            parts,
            source: template.to_vec(),
        })
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// First literal byte, used by the event parser to shortlist
    /// candidate sequences by introducer.
    pub fn first_byte(&self) -> Option<u8> {
        match self.parts.first() {
            Some(Part::Lit(l)) => l.first().copied(),
            _ => None,
        }
    }

    fn render_arg(&self, index: usize, value: u32, out: &mut Vec<u8>) {
        let proc = self.seq.arg_proc();
        let v = match proc {
            ArgProc::Decimal | ArgProc::Hex16 => value,
            ArgProc::Aix16Fg => aix16(value, 30, 90),
            ArgProc::Aix16Bg => aix16(value, 40, 100),
            ArgProc::Aix16FgBg => {
                if index == 0 {
                    aix16(value, 30, 90)
                } else {
                    aix16(value, 40, 100)
                }
            }
        };
        out.extend_from_slice(v.to_string().as_bytes());
    }

    /// Formats the sequence with the given arguments.
    pub fn emit(&self, args: &[u32]) -> Result<Vec<u8>> {
        if let Some(n) = self.seq.n_args() {
            if args.len() != n {
                return Err(Error::BadSeqTemplate(format!(
                    "{:?} takes {} arguments, got {}",
                    self.seq,
                    n,
                    args.len()
                )));
            }
        } else if args.len() > SEQ_ARGS_MAX - 1 {
            return Err(Error::BadSeqTemplate("too many arguments".into()));
        }

        let mut out = Vec::with_capacity(SEQ_LENGTH_MAX);
        for part in &self.parts {
            match part {
                Part::Lit(l) => out.extend_from_slice(l),
                Part::Arg(i) => self.render_arg(*i, args[*i], &mut out),
                Part::ArgList => {
                    for (k, a) in args.iter().enumerate() {
                        if k > 0 {
                            out.push(b';');
                        }
                        out.extend_from_slice(a.to_string().as_bytes());
                    }
                }
            }
        }
        Ok(out)
    }

    /// Matches `input` against this sequence. On `Success`, `args` holds
    /// the decoded arguments (−1 for absent) and `consumed` the matched
    /// byte count. `Again` means the input is a proper prefix.
    pub fn parse(&self, input: &[u8]) -> (ParseResult, Vec<i32>, usize) {
        let n_args = self.seq.n_args().unwrap_or(0);
        let mut args = vec![-1i32; n_args];
        let mut list_args: Vec<i32> = Vec::new();
        let mut pos = 0usize;

        for (pi, part) in self.parts.iter().enumerate() {
            match part {
                Part::Lit(l) => {
                    for &b in l {
                        if pos >= input.len() {
                            return (ParseResult::Again, Vec::new(), 0);
                        }
                        if input[pos] != b {
                            return (ParseResult::Failure, Vec::new(), 0);
                        }
                        pos += 1;
                    }
                }
                Part::Arg(i) => {
                    let is_hex = self.seq.arg_proc() == ArgProc::Hex16;
                    let start = pos;
                    while pos < input.len()
                        && (input[pos].is_ascii_digit()
                            || (is_hex && input[pos].is_ascii_hexdigit()))
                    {
                        pos += 1;
                    }
                    if pos == input.len() && pi + 1 < self.parts.len() {
                        // Digits may continue; we cannot finish the match.
                        return (ParseResult::Again, Vec::new(), 0);
                    }
                    if pos == start {
                        return (ParseResult::Failure, Vec::new(), 0);
                    }
                    let text = std::str::from_utf8(&input[start..pos]).expect("ascii digits");
                    let value = if is_hex {
                        match u32::from_str_radix(text, 16) {
                            Ok(v) => match text.len() {
                                2 => v,
                                4 => v >> 8,
                                _ => return (ParseResult::Failure, Vec::new(), 0),
                            },
                            Err(_) => return (ParseResult::Failure, Vec::new(), 0),
                        }
                    } else {
                        match text.parse::<u32>() {
                            Ok(v) => self.unrender(*i, v),
                            Err(_) => return (ParseResult::Failure, Vec::new(), 0),
                        }
                    };
                    args[*i] = value as i32;
                }
                Part::ArgList => loop {
                    let start = pos;
                    while pos < input.len() && input[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    if pos == input.len() && pi + 1 < self.parts.len() {
                        return (ParseResult::Again, Vec::new(), 0);
                    }
                    if pos > start {
                        let text = std::str::from_utf8(&input[start..pos]).expect("ascii");
                        match text.parse::<u32>() {
                            Ok(v) => list_args.push(v as i32),
                            Err(_) => return (ParseResult::Failure, Vec::new(), 0),
                        }
                    } else {
                        list_args.push(-1);
                    }
                    if pos < input.len() && input[pos] == b';' {
                        pos += 1;
                        continue;
                    }
                    break;
                },
            }
        }

        if self.seq.n_args().is_none() {
            args = list_args;
        }
        (ParseResult::Success, args, pos)
    }

    /// Inverse of `render_arg` for the aixterm mappings, so that
    /// parse(emit(x)) round-trips to x.
    fn unrender(&self, index: usize, value: u32) -> u32 {
        let un_fg = |v: u32| match v {
            30..=37 => v - 30,
            90..=97 => v - 90 + 8,
            _ => v,
        };
        let un_bg = |v: u32| match v {
            40..=47 => v - 40,
            100..=107 => v - 100 + 8,
            _ => v,
        };
        match self.seq.arg_proc() {
            ArgProc::Aix16Fg => un_fg(value),
            ArgProc::Aix16Bg => un_bg(value),
            ArgProc::Aix16FgBg => {
                if index == 0 {
                    un_fg(value)
                } else {
                    un_bg(value)
                }
            }
            _ => value,
        }
    }
}

fn aix16(value: u32, base: u32, bright_base: u32) -> u32 {
    if value < 8 {
        base + value
    } else {
        bright_base + (value - 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(seq: Seq, template: &str) -> CompiledSeq {
        CompiledSeq::compile(seq, template.as_bytes()).unwrap()
    }

    // ── Formatting (mirrors the historical formatting test) ─────────────

    #[test]
    fn formatting_concatenation() {
        let mut out = Vec::new();
        out.extend(compile(Seq::ResetTerminalSoft, "soft-reset").emit(&[]).unwrap());
        out.extend(compile(Seq::CursorUp, "cursor-up-%1").emit(&[9876]).unwrap());
        out.extend(
            compile(Seq::CursorToPos, "%1-cursor-to-pos-%2")
                .emit(&[1234, 0])
                .unwrap(),
        );
        out.extend(
            compile(Seq::SetColorFgDirect, "%1%2-fg-direct-%3")
                .emit(&[41, 0, 244])
                .unwrap(),
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "soft-resetcursor-up-98761234-cursor-to-pos-0410-fg-direct-244"
        );
    }

    #[test]
    fn formatting_aix16() {
        let fg = compile(Seq::SetColorFg16, "aix%1,");
        assert_eq!(fg.emit(&[0]).unwrap(), b"aix30,");
        assert_eq!(fg.emit(&[8]).unwrap(), b"aix90,");

        let bg = compile(Seq::SetColorBg16, "aix%1,");
        assert_eq!(bg.emit(&[0]).unwrap(), b"aix40,");
        assert_eq!(bg.emit(&[8]).unwrap(), b"aix100,");

        let fgbg = compile(Seq::SetColorFgbg16, "aix-%1-%2,");
        assert_eq!(fgbg.emit(&[0, 0]).unwrap(), b"aix-30-40,");
        assert_eq!(fgbg.emit(&[8, 8]).unwrap(), b"aix-90-100,");
    }

    #[test]
    fn emit_rejects_wrong_arity() {
        let c = compile(Seq::CursorUp, "up-%1;");
        assert!(c.emit(&[]).is_err());
        assert!(c.emit(&[1, 2]).is_err());
    }

    // ── Template validation ─────────────────────────────────────────────

    #[test]
    fn compile_rejects_out_of_range_index() {
        let err = CompiledSeq::compile(Seq::CursorUp, b"up-%2").unwrap_err();
        assert!(matches!(err, Error::BadSeqTemplate(_)));
    }

    #[test]
    fn compile_rejects_overlong_template() {
        let long = vec![b'x'; SEQ_LENGTH_MAX + 1];
        let err = CompiledSeq::compile(Seq::ResetAttributes, &long).unwrap_err();
        assert!(matches!(err, Error::SeqTooLong { .. }));
    }

    #[test]
    fn compile_accounts_for_argument_widths() {
        // 90 literal bytes + 10 for the argument exceeds the limit.
        let mut t = vec![b'x'; 90];
        t.extend_from_slice(b"%1");
        let err = CompiledSeq::compile(Seq::CursorUp, &t).unwrap_err();
        assert!(matches!(err, Error::SeqTooLong { .. }));
    }

    #[test]
    fn percent_escape() {
        let c = compile(Seq::ResetAttributes, "100%%");
        assert_eq!(c.emit(&[]).unwrap(), b"100%");
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn parse_round_trips_emit() {
        let defs: Vec<(Seq, &str, Vec<u32>)> = vec![
            (Seq::CursorUp, "\x1b[%1A", vec![42]),
            (Seq::CursorToPos, "\x1b[%1;%2H", vec![12, 345]),
            (Seq::SetColorFgDirect, "\x1b[38;2;%1;%2;%3m", vec![1, 22, 255]),
            (Seq::SetColorFg16, "\x1b[%1m", vec![13]),
            (Seq::CellSizePx, "\x1b[6;%1;%2t", vec![18, 9]),
        ];
        for (seq, template, args) in defs {
            let c = compile(seq, template);
            let bytes = c.emit(&args).unwrap();
            let (result, parsed, consumed) = c.parse(&bytes);
            assert_eq!(result, ParseResult::Success, "{:?}", seq);
            assert_eq!(consumed, bytes.len());
            let expect: Vec<i32> = args.iter().map(|&a| a as i32).collect();
            assert_eq!(parsed, expect, "{:?}", seq);
        }
    }

    #[test]
    fn parse_prefix_is_again() {
        let c = compile(Seq::CursorToPos, "\x1b[%1;%2H");
        assert_eq!(c.parse(b"\x1b[").0, ParseResult::Again);
        assert_eq!(c.parse(b"\x1b[12").0, ParseResult::Again);
        assert_eq!(c.parse(b"\x1b[12;3").0, ParseResult::Again);
    }

    #[test]
    fn parse_mismatch_is_failure() {
        let c = compile(Seq::CursorUp, "\x1b[%1A");
        assert_eq!(c.parse(b"\x1b[12B").0, ParseResult::Failure);
        assert_eq!(c.parse(b"\x1bX").0, ParseResult::Failure);
        // Missing digits before the final byte.
        assert_eq!(c.parse(b"\x1b[A").0, ParseResult::Failure);
    }

    #[test]
    fn parse_leaves_trailing_bytes() {
        let c = compile(Seq::CursorUp, "\x1b[%1A");
        let (result, args, consumed) = c.parse(b"\x1b[7Axyz");
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![7]);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn parse_hex16_color_reply_both_widths() {
        let c = compile(Seq::DefaultFg, "\x1b]10;rgb:%1/%2/%3\x1b\\");
        let (result, args, _) = c.parse(b"\x1b]10;rgb:ffff/8000/0000\x1b\\");
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![0xff, 0x80, 0x00]);

        let (result, args, _) = c.parse(b"\x1b]10;rgb:ff/80/00\x1b\\");
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![0xff, 0x80, 0x00]);
    }

    #[test]
    fn parse_varargs_device_attributes() {
        let c = CompiledSeq::compile(Seq::PrimaryDeviceAttributes, b"\x1b[?%vc").unwrap();
        let (result, args, consumed) = c.parse(b"\x1b[?62;4;22c");
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![62, 4, 22]);
        assert_eq!(consumed, 11);
    }

    #[test]
    fn parse_aix16_reverses_mapping() {
        let c = compile(Seq::SetColorFg16, "\x1b[%1m");
        let bytes = c.emit(&[12]).unwrap();
        assert_eq!(bytes, b"\x1b[94m");
        let (result, args, _) = c.parse(&bytes);
        assert_eq!(result, ParseResult::Success);
        assert_eq!(args, vec![12]);
    }
}
