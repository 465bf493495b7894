//! Known-terminal database and environment-based detection.

use std::collections::HashMap;

use crate::canvas::config::{CanvasMode, PixelMode};
use crate::symbols::{tag, Tags};
use crate::term::info::{Passthrough, TermInfo};
use crate::term::seq::Seq;

/// Everything a terminal that renders symbols correctly can show.
const SAFE_ALL: Tags = !0;
const SAFE_ASCII: Tags = tag::SPACE | tag::ASCII | tag::ALPHA | tag::DIGIT;

pub struct TermDb {
    fallback: TermInfo,
}

impl Default for TermDb {
    fn default() -> Self {
        Self::new()
    }
}

impl TermDb {
    pub fn new() -> Self {
        Self {
            fallback: fallback_info(),
        }
    }

    /// The process-wide database.
    pub fn get_default() -> &'static TermDb {
        use std::sync::OnceLock;
        static DB: OnceLock<TermDb> = OnceLock::new();
        DB.get_or_init(TermDb::new)
    }

    /// A conservative ANSI terminal: 256 colors, no pixel protocols.
    pub fn fallback_info(&self) -> TermInfo {
        self.fallback.clone()
    }

    /// Detects the best-matching TermInfo from the process environment.
    pub fn detect_from_env(&self) -> TermInfo {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.detect(&vars)
    }

    /// Detection rule: the most specific program identifiers win over
    /// `TERM`, multiplexer variables wrap the result in a passthrough
    /// chain, and the locale decides whether non-ASCII symbols are safe.
    pub fn detect(&self, vars: &HashMap<String, String>) -> TermInfo {
        let get = |k: &str| vars.get(k).map(|s| s.as_str()).unwrap_or("");
        let term = get("TERM");

        let mut info = if get("TERM_PROGRAM") == "iTerm.app" {
            iterm2_info()
        } else if get("TERM_PROGRAM") == "WezTerm" {
            wezterm_info()
        } else if get("TERM_PROGRAM") == "Apple_Terminal" {
            apple_terminal_info()
        } else if !get("WT_SESSION").is_empty() {
            windows_terminal_info()
        } else if !get("KONSOLE_VERSION").is_empty() {
            konsole_info()
        } else if !get("VTE_VERSION").is_empty() {
            vte_info(get("VTE_VERSION").parse().unwrap_or(0))
        } else if term.contains("kitty") {
            kitty_info()
        } else if term == "foot" || term.starts_with("foot-") {
            foot_info()
        } else if term == "mlterm" {
            mlterm_info()
        } else if term == "linux" {
            linux_console_info()
        } else if term.ends_with("-direct") || term.ends_with("-truecolor") {
            direct_color_info(term)
        } else if term.ends_with("-256color") {
            xterm_256_info(term)
        } else if term.starts_with("rxvt") {
            rxvt_info()
        } else if term.starts_with("xterm") {
            xterm_info()
        } else if !get("ANSICON").is_empty() {
            ansicon_info()
        } else {
            let mut fallback = self.fallback.clone();
            if !term.is_empty() {
                fallback.set_name(term);
            }
            fallback
        };

        // COLORTERM is authoritative for direct color regardless of TERM.
        let colorterm = get("COLORTERM");
        if colorterm == "truecolor" || colorterm == "24bit" {
            info.add_canvas_mode(CanvasMode::Truecolor);
        }

        // Non-UTF-8 locales restrict the symbol repertoire to ASCII.
        let locale = [get("LC_ALL"), get("LC_CTYPE"), get("LANG")]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("");
        if !locale.is_empty()
            && !locale.to_ascii_uppercase().contains("UTF-8")
            && !locale.to_ascii_uppercase().contains("UTF8")
        {
            info.set_safe_symbol_tags(SAFE_ASCII);
        }

        // Multiplexers wrap the real terminal; sequences needing pixel
        // data must use passthrough guards.
        if !get("TMUX").is_empty() {
            let mut outer = multiplexer_info("tmux", Passthrough::Tmux);
            outer.set_pixel_passthrough_needed(PixelMode::Sixels, true);
            outer.set_pixel_passthrough_needed(PixelMode::Kitty, true);
            outer.set_pixel_passthrough_needed(PixelMode::Iterm2, true);
            let mut chained = TermInfo::chain(&outer, &info);
            chained.set_name(&format!("tmux/{}", info.name()));
            chained.set_passthrough_type(Passthrough::Tmux);
            info = chained;
        } else if !get("STY").is_empty() {
            let mut outer = multiplexer_info("screen", Passthrough::Screen);
            outer.set_pixel_passthrough_needed(PixelMode::Sixels, true);
            let mut chained = TermInfo::chain(&outer, &info);
            chained.set_name(&format!("screen/{}", info.name()));
            chained.set_passthrough_type(Passthrough::Screen);
            info = chained;
        }

        log::debug!("detected terminal: {}", info.name());
        info
    }
}

fn set(info: &mut TermInfo, seq: Seq, template: &str) {
    info.set_seq(seq, Some(template.as_bytes()))
        .expect("builtin template");
}

/// Sequences every ANSI-ish terminal gets.
fn ansi_base(name: &str) -> TermInfo {
    let mut info = TermInfo::new();
    info.set_name(name);

    set(&mut info, Seq::ResetTerminalSoft, "\x1b[!p");
    set(&mut info, Seq::ResetAttributes, "\x1b[0m");
    set(&mut info, Seq::InvertColors, "\x1b[7m");
    set(&mut info, Seq::CursorUp, "\x1b[%1A");
    set(&mut info, Seq::CursorDown, "\x1b[%1B");
    set(&mut info, Seq::CursorRight, "\x1b[%1C");
    set(&mut info, Seq::CursorLeft, "\x1b[%1D");
    set(&mut info, Seq::CursorToTopLeft, "\x1b[H");
    set(&mut info, Seq::CursorToPos, "\x1b[%1;%2H");
    set(&mut info, Seq::CursorDownScroll, "\x1bD");
    set(&mut info, Seq::SaveCursorPos, "\x1b7");
    set(&mut info, Seq::RestoreCursorPos, "\x1b8");
    set(&mut info, Seq::SetColorFg16, "\x1b[%1m");
    set(&mut info, Seq::SetColorBg16, "\x1b[%1m");
    set(&mut info, Seq::SetColorFgbg16, "\x1b[%1;%2m");
    set(&mut info, Seq::ResetColorFgbg, "\x1b[39;49m");
    set(&mut info, Seq::RepeatChar, "\x1b[%1b");
    set(&mut info, Seq::QueryPrimaryDeviceAttributes, "\x1b[c");
    set(&mut info, Seq::PrimaryDeviceAttributes, "\x1b[?%vc");

    info.add_canvas_mode(CanvasMode::Indexed16);
    info.add_canvas_mode(CanvasMode::Indexed16_8);
    info.add_canvas_mode(CanvasMode::Indexed8);
    info.add_canvas_mode(CanvasMode::FgBgBgFg);
    info.add_canvas_mode(CanvasMode::FgBg);
    info.set_safe_symbol_tags(SAFE_ALL);
    info
}

/// Adds 256-color support and the xterm query/reply repertoire.
fn xterm_like(name: &str) -> TermInfo {
    let mut info = ansi_base(name);
    set(&mut info, Seq::SetColorFg256, "\x1b[38;5;%1m");
    set(&mut info, Seq::SetColorBg256, "\x1b[48;5;%1m");
    set(&mut info, Seq::SetColorFgbg256, "\x1b[38;5;%1;48;5;%2m");
    set(&mut info, Seq::QueryDefaultFg, "\x1b]10;?\x1b\\");
    set(&mut info, Seq::DefaultFg, "\x1b]10;rgb:%1/%2/%3\x1b\\");
    set(&mut info, Seq::QueryDefaultBg, "\x1b]11;?\x1b\\");
    set(&mut info, Seq::DefaultBg, "\x1b]11;rgb:%1/%2/%3\x1b\\");
    set(&mut info, Seq::QueryTextAreaSizeCells, "\x1b[18t");
    set(&mut info, Seq::TextAreaSizeCells, "\x1b[8;%1;%2t");
    set(&mut info, Seq::QueryTextAreaSizePx, "\x1b[14t");
    set(&mut info, Seq::TextAreaSizePx, "\x1b[4;%1;%2t");
    set(&mut info, Seq::QueryCellSizePx, "\x1b[16t");
    set(&mut info, Seq::CellSizePx, "\x1b[6;%1;%2t");
    info.add_canvas_mode(CanvasMode::Indexed256);
    info.add_canvas_mode(CanvasMode::Indexed240);
    info
}

fn add_direct_color(info: &mut TermInfo) {
    set(info, Seq::SetColorFgDirect, "\x1b[38;2;%1;%2;%3m");
    set(info, Seq::SetColorBgDirect, "\x1b[48;2;%1;%2;%3m");
    set(
        info,
        Seq::SetColorFgbgDirect,
        "\x1b[38;2;%1;%2;%3;48;2;%4;%5;%6m",
    );
    info.add_canvas_mode(CanvasMode::Truecolor);
}

pub(crate) fn add_sixel_seqs(info: &mut TermInfo) {
    set(info, Seq::BeginSixels, "\x1bPq");
    set(info, Seq::EndSixels, "\x1b\\");
    set(info, Seq::EnableSixelScrolling, "\x1b[?80l");
    set(info, Seq::DisableSixelScrolling, "\x1b[?80h");
    set(info, Seq::SetSixelAdvanceDown, "\x1b[?8452l");
    set(info, Seq::SetSixelAdvanceRight, "\x1b[?8452h");
    info.add_pixel_mode(PixelMode::Sixels);
}

fn fallback_info() -> TermInfo {
    xterm_like("ansi-fallback")
}

fn xterm_info() -> TermInfo {
    xterm_like("xterm")
}

fn xterm_256_info(name: &str) -> TermInfo {
    xterm_like(name)
}

fn direct_color_info(name: &str) -> TermInfo {
    let mut info = xterm_like(name);
    add_direct_color(&mut info);
    info
}

fn kitty_info() -> TermInfo {
    let mut info = xterm_like("kitty");
    add_direct_color(&mut info);
    info.add_pixel_mode(PixelMode::Kitty);
    info
}

fn foot_info() -> TermInfo {
    let mut info = xterm_like("foot");
    add_direct_color(&mut info);
    add_sixel_seqs(&mut info);
    info
}

fn mlterm_info() -> TermInfo {
    let mut info = xterm_like("mlterm");
    add_direct_color(&mut info);
    add_sixel_seqs(&mut info);
    info
}

fn iterm2_info() -> TermInfo {
    let mut info = xterm_like("iterm2");
    add_direct_color(&mut info);
    info.add_pixel_mode(PixelMode::Iterm2);
    info
}

fn wezterm_info() -> TermInfo {
    let mut info = xterm_like("wezterm");
    add_direct_color(&mut info);
    add_sixel_seqs(&mut info);
    info.add_pixel_mode(PixelMode::Iterm2);
    info.add_pixel_mode(PixelMode::Kitty);
    info
}

fn apple_terminal_info() -> TermInfo {
    xterm_like("nsterm")
}

fn windows_terminal_info() -> TermInfo {
    let mut info = xterm_like("windows-terminal");
    add_direct_color(&mut info);
    info
}

fn konsole_info() -> TermInfo {
    let mut info = xterm_like("konsole");
    add_direct_color(&mut info);
    info
}

fn vte_info(version: u32) -> TermInfo {
    let mut info = xterm_like("vte");
    // Direct color is reliable from 0.36 on.
    if version >= 3600 {
        add_direct_color(&mut info);
    }
    info
}

fn rxvt_info() -> TermInfo {
    xterm_like("rxvt")
}

fn linux_console_info() -> TermInfo {
    let mut info = ansi_base("linux");
    info.set_safe_symbol_tags(
        tag::SPACE | tag::ASCII | tag::ALPHA | tag::DIGIT | tag::SOLID | tag::VHALF | tag::HHALF
            | tag::BLOCK | tag::BORDER | tag::STIPPLE,
    );
    info
}

fn ansicon_info() -> TermInfo {
    let mut info = ansi_base("ansicon");
    info.set_safe_symbol_tags(SAFE_ASCII);
    info
}

fn multiplexer_info(name: &str, passthrough: Passthrough) -> TermInfo {
    let mut info = xterm_like(name);
    info.set_passthrough_type(passthrough);
    set(&mut info, Seq::BeginScreenPassthrough, "\x1bP");
    set(&mut info, Seq::EndScreenPassthrough, "\x1b\\");
    set(&mut info, Seq::BeginTmuxPassthrough, "\x1bPtmux;");
    set(&mut info, Seq::EndTmuxPassthrough, "\x1b\\");
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn detects_xterm_256color() {
        let info = TermDb::new().detect(&env(&[("TERM", "xterm-256color")]));
        assert_eq!(info.name(), "xterm-256color");
        assert!(info.is_canvas_mode_supported(CanvasMode::Indexed256));
        assert!(!info.is_canvas_mode_supported(CanvasMode::Truecolor));
    }

    #[test]
    fn colorterm_upgrades_to_truecolor() {
        let info = TermDb::new().detect(&env(&[
            ("TERM", "xterm-256color"),
            ("COLORTERM", "truecolor"),
        ]));
        assert!(info.is_canvas_mode_supported(CanvasMode::Truecolor));
    }

    #[test]
    fn term_program_beats_term() {
        let info = TermDb::new().detect(&env(&[
            ("TERM", "xterm-256color"),
            ("TERM_PROGRAM", "iTerm.app"),
        ]));
        assert_eq!(info.name(), "iterm2");
        assert!(info.is_pixel_mode_supported(PixelMode::Iterm2));
    }

    #[test]
    fn kitty_by_term_name() {
        let info = TermDb::new().detect(&env(&[("TERM", "xterm-kitty")]));
        assert_eq!(info.name(), "kitty");
        assert!(info.is_pixel_mode_supported(PixelMode::Kitty));
    }

    #[test]
    fn tmux_wraps_inner_terminal() {
        let info = TermDb::new().detect(&env(&[
            ("TERM", "foot"),
            ("TMUX", "/tmp/tmux-1000/default,123,0"),
        ]));
        assert_eq!(info.name(), "tmux/foot");
        assert_eq!(info.passthrough_type(), Passthrough::Tmux);
        assert!(info.is_pixel_passthrough_needed(PixelMode::Sixels));
    }

    #[test]
    fn screen_wraps_inner_terminal() {
        let info = TermDb::new().detect(&env(&[
            ("TERM", "xterm"),
            ("STY", "1234.pts-0.host"),
        ]));
        assert_eq!(info.name(), "screen/xterm");
        assert_eq!(info.passthrough_type(), Passthrough::Screen);
    }

    #[test]
    fn non_utf8_locale_restricts_symbols() {
        let info = TermDb::new().detect(&env(&[
            ("TERM", "xterm-256color"),
            ("LANG", "C"),
        ]));
        assert_eq!(info.safe_symbol_tags(), SAFE_ASCII);

        let info = TermDb::new().detect(&env(&[
            ("TERM", "xterm-256color"),
            ("LANG", "en_US.UTF-8"),
        ]));
        assert_ne!(info.safe_symbol_tags(), SAFE_ASCII);
    }

    #[test]
    fn empty_environment_falls_back() {
        let info = TermDb::new().detect(&env(&[]));
        assert_eq!(info.name(), "ansi-fallback");
        assert!(info.is_canvas_mode_supported(CanvasMode::Indexed256));
        assert!(info.have_seq(Seq::SetColorFg256));
    }

    #[test]
    fn vte_version_gates_direct_color() {
        let db = TermDb::new();
        let old = db.detect(&env(&[("TERM", "xterm"), ("VTE_VERSION", "3405")]));
        assert!(!old.is_canvas_mode_supported(CanvasMode::Truecolor));
        let new = db.detect(&env(&[("TERM", "xterm"), ("VTE_VERSION", "7200")]));
        assert!(new.is_canvas_mode_supported(CanvasMode::Truecolor));
    }

    #[test]
    fn linux_console_limits_safe_tags() {
        let info = TermDb::new().detect(&env(&[("TERM", "linux"), ("LANG", "en_US.UTF-8")]));
        assert_eq!(info.name(), "linux");
        assert_eq!(info.safe_symbol_tags() & tag::BRAILLE, 0);
    }
}
