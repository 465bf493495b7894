//! Streaming decoder for terminal input: UTF-8 characters and control
//! sequences matched against a TermInfo.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::term::info::TermInfo;
use crate::term::seq::{ParseResult, Seq};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Eof,
    Unichar(char),
    Seq { seq: Seq, args: Vec<i32> },
}

impl Event {
    pub fn seq(&self) -> Option<Seq> {
        match self {
            Event::Seq { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    pub fn unichar(&self) -> Option<char> {
        match self {
            Event::Unichar(c) => Some(*c),
            _ => None,
        }
    }

    /// The nth sequence argument, or −1 when absent.
    pub fn seq_arg(&self, n: usize) -> i32 {
        match self {
            Event::Seq { args, .. } => args.get(n).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    pub fn n_seq_args(&self) -> usize {
        match self {
            Event::Seq { args, .. } => args.len(),
            _ => 0,
        }
    }
}

enum Scan {
    /// A complete escape sequence of this many bytes sits at the head.
    Complete(usize),
    /// More bytes are needed to delimit it.
    Incomplete,
}

pub struct EventParser {
    term_info: Arc<TermInfo>,
    buf: Vec<u8>,
    pending: VecDeque<Event>,
    eof_pushed: bool,
    eof_emitted: bool,
}

impl EventParser {
    pub fn new(term_info: Arc<TermInfo>) -> Self {
        Self {
            term_info,
            buf: Vec::new(),
            pending: VecDeque::new(),
            eof_pushed: false,
            eof_emitted: false,
        }
    }

    pub fn term_info(&self) -> &Arc<TermInfo> {
        &self.term_info
    }

    /// Swaps the capability record (e.g. after a probe supplements it).
    /// Buffered bytes and queued events are unaffected.
    pub fn set_term_info(&mut self, term_info: Arc<TermInfo>) {
        self.term_info = term_info;
    }

    pub fn push_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn push_eof(&mut self) {
        self.eof_pushed = true;
    }

    /// Pops the next decoded event; `None` means more input is needed.
    pub fn pop_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if self.buf.is_empty() {
                if self.eof_pushed && !self.eof_emitted {
                    self.eof_emitted = true;
                    return Some(Event::Eof);
                }
                return None;
            }

            let b0 = self.buf[0];
            if b0 == 0x1b || b0 == 0x9b {
                match self.scan_escape() {
                    Scan::Complete(len) => self.consume_escape(len),
                    Scan::Incomplete => {
                        if self.eof_pushed {
                            // Incomplete escape at end of stream is dropped.
                            self.buf.clear();
                            continue;
                        }
                        return None;
                    }
                }
            } else if !self.consume_utf8() {
                return None;
            }
        }
    }

    /// Finds the extent of the escape sequence at the head of the buffer.
    fn scan_escape(&self) -> Scan {
        let buf = &self.buf;

        if buf[0] == 0x9b {
            return scan_csi_body(buf, 1);
        }
        if buf.len() < 2 {
            return Scan::Incomplete;
        }

        match buf[1] {
            b'[' => scan_csi_body(buf, 2),
            b']' | b'P' | b'_' | b'^' | b'X' => {
                // String sequence: runs to BEL or ST (ESC \). An ESC that
                // starts anything else ends the string unterminated.
                let mut i = 2;
                while i < buf.len() {
                    match buf[i] {
                        0x07 => return Scan::Complete(i + 1),
                        0x1b => {
                            if i + 1 >= buf.len() {
                                return Scan::Incomplete;
                            }
                            if buf[i + 1] == b'\\' {
                                return Scan::Complete(i + 2);
                            }
                            return Scan::Complete(i);
                        }
                        _ => i += 1,
                    }
                }
                Scan::Incomplete
            }
            // Two-byte escape.
            _ => Scan::Complete(2),
        }
    }

    /// Matches a complete escape sequence against the TermInfo, degrading
    /// to per-byte Unichar events when nothing matches.
    fn consume_escape(&mut self, len: usize) {
        let raw: Vec<u8> = self.buf.drain(..len).collect();

        // OSC replies may arrive BEL-terminated; templates use ST. Match
        // against the normalized form but degrade to the original bytes.
        let candidate = if raw.len() >= 2 && raw[1] == b']' && raw.last() == Some(&0x07) {
            let mut c = raw[..raw.len() - 1].to_vec();
            c.extend_from_slice(b"\x1b\\");
            c
        } else {
            raw.clone()
        };

        for seq in Seq::ALL {
            let (result, args, consumed) = self.term_info.parse_seq(seq, &candidate);
            if result == ParseResult::Success && consumed == candidate.len() {
                self.pending.push_back(Event::Seq { seq, args });
                return;
            }
        }

        for &b in &raw {
            self.pending.push_back(Event::Unichar(b as char));
        }
    }

    /// Decodes one UTF-8 character from the head of the buffer. Returns
    /// false when more input is required.
    fn consume_utf8(&mut self) -> bool {
        let b0 = self.buf[0];
        let need = if b0 < 0x80 {
            1
        } else if b0 & 0xe0 == 0xc0 {
            2
        } else if b0 & 0xf0 == 0xe0 {
            3
        } else if b0 & 0xf8 == 0xf0 {
            4
        } else {
            // Stray continuation or invalid lead byte.
            self.buf.remove(0);
            self.pending.push_back(Event::Unichar('\u{fffd}'));
            return true;
        };

        if self.buf.len() < need {
            if self.eof_pushed {
                // Incomplete character at end of stream is dropped.
                self.buf.clear();
                return true;
            }
            return false;
        }

        match std::str::from_utf8(&self.buf[..need]) {
            Ok(s) => {
                let ch = s.chars().next().expect("nonempty");
                self.buf.drain(..need);
                self.pending.push_back(Event::Unichar(ch));
            }
            Err(_) => {
                self.buf.remove(0);
                self.pending.push_back(Event::Unichar('\u{fffd}'));
            }
        }
        true
    }
}

fn scan_csi_body(buf: &[u8], start: usize) -> Scan {
    for (i, &b) in buf.iter().enumerate().skip(start) {
        if (0x40..=0x7e).contains(&b) {
            return Scan::Complete(i + 1);
        }
        if !(0x20..=0x3f).contains(&b) {
            // Malformed parameter byte; cut the sequence here so it can
            // degrade to characters.
            return Scan::Complete(i + 1);
        }
    }
    Scan::Incomplete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::db::TermDb;
    use std::collections::HashMap;

    fn parser() -> EventParser {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), "foot".to_string());
        env.insert("LANG".to_string(), "en_US.UTF-8".to_string());
        let info = TermDb::new().detect(&env);
        EventParser::new(Arc::new(info))
    }

    fn drain(p: &mut EventParser) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(e) = p.pop_event() {
            out.push(e);
        }
        out
    }

    #[test]
    fn plain_text_round_trips_losslessly() {
        let mut p = parser();
        let input = "hej världen ✓ 漢字\n";
        p.push_data(input.as_bytes());

        let events = drain(&mut p);
        let decoded: String = events
            .iter()
            .map(|e| e.unichar().expect("only unichars"))
            .collect();
        assert_eq!(decoded, input);
    }

    #[test]
    fn csi_split_across_pushes() {
        let mut p = parser();
        p.push_data(b"\x1b[8;2");
        assert_eq!(p.pop_event(), None);
        p.push_data(b"4;80t");

        let e = p.pop_event().unwrap();
        assert_eq!(e.seq(), Some(Seq::TextAreaSizeCells));
        assert_eq!(e.seq_arg(0), 24);
        assert_eq!(e.seq_arg(1), 80);
        assert_eq!(e.seq_arg(2), -1);
    }

    #[test]
    fn unknown_csi_degrades_to_unichars() {
        let mut p = parser();
        p.push_data(b"\x1b[99Z");
        let events = drain(&mut p);
        let bytes: Vec<u8> = events
            .iter()
            .map(|e| e.unichar().unwrap() as u8)
            .collect();
        assert_eq!(bytes, b"\x1b[99Z");
    }

    #[test]
    fn osc_color_reply_with_bel_terminator() {
        let mut p = parser();
        p.push_data(b"\x1b]11;rgb:1e1e/2a2a/3b3b\x07");
        let e = p.pop_event().unwrap();
        assert_eq!(e.seq(), Some(Seq::DefaultBg));
        assert_eq!(e.seq_arg(0), 0x1e);
        assert_eq!(e.seq_arg(1), 0x2a);
        assert_eq!(e.seq_arg(2), 0x3b);
    }

    #[test]
    fn osc_color_reply_with_st_terminator() {
        let mut p = parser();
        p.push_data(b"\x1b]10;rgb:ff/ff/ff\x1b\\");
        let e = p.pop_event().unwrap();
        assert_eq!(e.seq(), Some(Seq::DefaultFg));
        assert_eq!(e.seq_arg(0), 0xff);
    }

    #[test]
    fn device_attributes_reply_varargs() {
        let mut p = parser();
        p.push_data(b"\x1b[?62;4;22c");
        let e = p.pop_event().unwrap();
        assert_eq!(e.seq(), Some(Seq::PrimaryDeviceAttributes));
        assert_eq!(e.n_seq_args(), 3);
        assert_eq!(e.seq_arg(1), 4);
    }

    #[test]
    fn text_and_sequences_interleave_in_order() {
        let mut p = parser();
        p.push_data(b"ab\x1b[3Acd");
        let events = drain(&mut p);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].unichar(), Some('a'));
        assert_eq!(events[1].unichar(), Some('b'));
        assert_eq!(events[2].seq(), Some(Seq::CursorUp));
        assert_eq!(events[2].seq_arg(0), 3);
        assert_eq!(events[3].unichar(), Some('c'));
        assert_eq!(events[4].unichar(), Some('d'));
    }

    #[test]
    fn eof_drains_and_emits_once() {
        let mut p = parser();
        p.push_data(b"x\x1b[12");
        p.push_eof();

        assert_eq!(p.pop_event().unwrap().unichar(), Some('x'));
        // The incomplete escape is discarded at EOF.
        assert_eq!(p.pop_event().unwrap(), Event::Eof);
        assert_eq!(p.pop_event(), None);
    }

    #[test]
    fn incomplete_utf8_waits_for_continuation() {
        let mut p = parser();
        p.push_data(&[0xe2, 0x9c]);
        assert_eq!(p.pop_event(), None);
        p.push_data(&[0x93]);
        assert_eq!(p.pop_event().unwrap().unichar(), Some('✓'));
    }
}
