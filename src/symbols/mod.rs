//! The glyph alphabet: builtin symbols with coverage bitmaps and tags.
//!
//! Every symbol carries an 8×8 coverage bitmap (16×8 for wide glyphs): bit
//! (y*8 + x) is set iff the glyph inks that pixel of its cell. Most shapes
//! are defined below as art strings, the way bitmap fonts are usually
//! written down; the Braille and sextant ranges are generated from their
//! code-point bit layouts instead.

pub mod map;

pub use map::{Candidate, Compiled, SymbolMap};

use unicode_width::UnicodeWidthChar;

pub const SYMBOL_WIDTH: usize = 8;
pub const SYMBOL_HEIGHT: usize = 8;

pub type Tags = u32;

/// Symbol category bits. `HALF`, `ALNUM`, `BAD` and `ALL` are composites.
pub mod tag {
    use super::Tags;

    pub const NONE: Tags = 0;
    pub const SPACE: Tags = 1 << 0;
    pub const SOLID: Tags = 1 << 1;
    pub const STIPPLE: Tags = 1 << 2;
    pub const BLOCK: Tags = 1 << 3;
    pub const BORDER: Tags = 1 << 4;
    pub const DIAGONAL: Tags = 1 << 5;
    pub const DOT: Tags = 1 << 6;
    pub const QUAD: Tags = 1 << 7;
    pub const HHALF: Tags = 1 << 8;
    pub const VHALF: Tags = 1 << 9;
    pub const HALF: Tags = HHALF | VHALF;
    pub const INVERTED: Tags = 1 << 10;
    pub const BRAILLE: Tags = 1 << 11;
    pub const TECHNICAL: Tags = 1 << 12;
    pub const GEOMETRIC: Tags = 1 << 13;
    pub const ASCII: Tags = 1 << 14;
    pub const ALPHA: Tags = 1 << 15;
    pub const DIGIT: Tags = 1 << 16;
    pub const ALNUM: Tags = ALPHA | DIGIT;
    pub const NARROW: Tags = 1 << 17;
    pub const WIDE: Tags = 1 << 18;
    pub const AMBIGUOUS: Tags = 1 << 19;
    pub const UGLY: Tags = 1 << 20;
    pub const LEGACY: Tags = 1 << 21;
    pub const SEXTANT: Tags = 1 << 22;
    pub const WEDGE: Tags = 1 << 23;
    pub const LATIN: Tags = 1 << 24;
    pub const EXTRA: Tags = 1 << 30;
    pub const BAD: Tags = AMBIGUOUS | UGLY;
    pub const ALL: Tags = !(EXTRA | BAD);

    /// Case-insensitive tag lookup used by selector strings.
    pub fn by_name(name: &str) -> Option<Tags> {
        let tags = match name.to_ascii_lowercase().as_str() {
            "none" => NONE,
            "space" => SPACE,
            "solid" => SOLID,
            "stipple" => STIPPLE,
            "block" => BLOCK,
            "border" => BORDER,
            "diagonal" => DIAGONAL,
            "dot" => DOT,
            "quad" => QUAD,
            "hhalf" => HHALF,
            "vhalf" => VHALF,
            "half" => HALF,
            "inverted" => INVERTED,
            "braille" => BRAILLE,
            "technical" => TECHNICAL,
            "geometric" => GEOMETRIC,
            "ascii" => ASCII,
            "alpha" => ALPHA,
            "digit" => DIGIT,
            "alnum" => ALNUM,
            "narrow" => NARROW,
            "wide" => WIDE,
            "ambiguous" => AMBIGUOUS,
            "ugly" => UGLY,
            "legacy" => LEGACY,
            "sextant" => SEXTANT,
            "wedge" => WEDGE,
            "latin" => LATIN,
            "extra" => EXTRA,
            "bad" => BAD,
            "all" => ALL,
            _ => return None,
        };
        Some(tags)
    }
}

/// Coverage bitmap; wide glyphs span two cells, left word first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Narrow(u64),
    Wide([u64; 2]),
}

impl Coverage {
    pub fn popcount(&self) -> u32 {
        match self {
            Coverage::Narrow(b) => b.count_ones(),
            Coverage::Wide([l, r]) => l.count_ones() + r.count_ones(),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Coverage::Wide(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub ch: char,
    pub tags: Tags,
    pub coverage: Coverage,
}

/// One of NARROW / WIDE / AMBIGUOUS, from the display width of the code
/// point. Ambiguous-width characters render single-cell in Western
/// terminals and double-cell in CJK ones.
pub fn width_tag(ch: char) -> Tags {
    match (ch.width(), ch.width_cjk()) {
        (Some(2), _) => tag::WIDE,
        (Some(1), Some(2)) => tag::AMBIGUOUS,
        _ => tag::NARROW,
    }
}

fn bitmap_from_art(rows: [&str; 8]) -> u64 {
    let mut bits = 0u64;
    for (y, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 8, "art row must be 8 columns");
        for (x, c) in row.bytes().enumerate() {
            if c == b'#' || c == b'X' {
                bits |= 1u64 << (y * 8 + x);
            }
        }
    }
    bits
}

/// Fill a rectangle [x0,x1) × [y0,y1) of an 8×8 bitmap.
fn fill_rect(bits: &mut u64, x0: usize, x1: usize, y0: usize, y1: usize) {
    for y in y0..y1 {
        for x in x0..x1 {
            *bits |= 1u64 << (y * 8 + x);
        }
    }
}

struct Def {
    ch: char,
    tags: Tags,
    rows: [&'static str; 8],
}

macro_rules! sym {
    ($ch:literal, $tags:expr, $($row:literal)*) => {
        Def { ch: $ch, tags: $tags, rows: [$($row),*] }
    };
}

// ── Block elements, quadrants, shades ───────────────────────────────────

#[rustfmt::skip]
fn block_defs() -> Vec<Def> {
    use tag::*;
    vec![
        sym!(' ', SPACE | ASCII,
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "),
        sym!('█', SOLID | BLOCK | INVERTED,
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"),
        sym!('▀', VHALF | BLOCK | INVERTED,
            "########"
            "########"
            "########"
            "########"
            "        "
            "        "
            "        "
            "        "),
        sym!('▄', VHALF | BLOCK,
            "        "
            "        "
            "        "
            "        "
            "########"
            "########"
            "########"
            "########"),
        sym!('▌', HHALF | BLOCK,
            "####    "
            "####    "
            "####    "
            "####    "
            "####    "
            "####    "
            "####    "
            "####    "),
        sym!('▐', HHALF | BLOCK,
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "    ####"),
        sym!('▁', BLOCK,
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "########"),
        sym!('▂', BLOCK,
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "########"
            "########"),
        sym!('▃', BLOCK,
            "        "
            "        "
            "        "
            "        "
            "        "
            "########"
            "########"
            "########"),
        sym!('▅', BLOCK,
            "        "
            "        "
            "        "
            "########"
            "########"
            "########"
            "########"
            "########"),
        sym!('▆', BLOCK,
            "        "
            "        "
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"),
        sym!('▇', BLOCK | INVERTED,
            "        "
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"
            "########"),
        sym!('▎', BLOCK,
            "##      "
            "##      "
            "##      "
            "##      "
            "##      "
            "##      "
            "##      "
            "##      "),
        sym!('▍', BLOCK,
            "###     "
            "###     "
            "###     "
            "###     "
            "###     "
            "###     "
            "###     "
            "###     "),
        sym!('▋', BLOCK | INVERTED,
            "#####   "
            "#####   "
            "#####   "
            "#####   "
            "#####   "
            "#####   "
            "#####   "
            "#####   "),
        sym!('▊', BLOCK | INVERTED,
            "######  "
            "######  "
            "######  "
            "######  "
            "######  "
            "######  "
            "######  "
            "######  "),
        sym!('▖', QUAD | BLOCK,
            "        "
            "        "
            "        "
            "        "
            "####    "
            "####    "
            "####    "
            "####    "),
        sym!('▗', QUAD | BLOCK,
            "        "
            "        "
            "        "
            "        "
            "    ####"
            "    ####"
            "    ####"
            "    ####"),
        sym!('▘', QUAD | BLOCK,
            "####    "
            "####    "
            "####    "
            "####    "
            "        "
            "        "
            "        "
            "        "),
        sym!('▝', QUAD | BLOCK,
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "        "
            "        "
            "        "
            "        "),
        sym!('▚', QUAD | BLOCK,
            "####    "
            "####    "
            "####    "
            "####    "
            "    ####"
            "    ####"
            "    ####"
            "    ####"),
        sym!('▞', QUAD | BLOCK,
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "####    "
            "####    "
            "####    "
            "####    "),
        sym!('▙', QUAD | BLOCK | INVERTED,
            "####    "
            "####    "
            "####    "
            "####    "
            "########"
            "########"
            "########"
            "########"),
        sym!('▟', QUAD | BLOCK | INVERTED,
            "    ####"
            "    ####"
            "    ####"
            "    ####"
            "########"
            "########"
            "########"
            "########"),
        sym!('▛', QUAD | BLOCK | INVERTED,
            "########"
            "########"
            "########"
            "########"
            "####    "
            "####    "
            "####    "
            "####    "),
        sym!('▜', QUAD | BLOCK | INVERTED,
            "########"
            "########"
            "########"
            "########"
            "    ####"
            "    ####"
            "    ####"
            "    ####"),
        sym!('░', STIPPLE | BLOCK,
            "#   #   "
            "  #   # "
            "#   #   "
            "  #   # "
            "#   #   "
            "  #   # "
            "#   #   "
            "  #   # "),
        sym!('▒', STIPPLE | BLOCK,
            "# # # # "
            " # # # #"
            "# # # # "
            " # # # #"
            "# # # # "
            " # # # #"
            "# # # # "
            " # # # #"),
        sym!('▓', STIPPLE | BLOCK | INVERTED,
            "### ### "
            "## ### #"
            "### ### "
            "## ### #"
            "### ### "
            "## ### #"
            "### ### "
            "## ### #"),
    ]
}

// ── Borders, diagonals, dots, geometry, technical ───────────────────────

#[rustfmt::skip]
fn line_defs() -> Vec<Def> {
    use tag::*;
    vec![
        sym!('─', BORDER,
            "        "
            "        "
            "        "
            "########"
            "########"
            "        "
            "        "
            "        "),
        sym!('│', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "   ##   "
            "   ##   "
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('┌', BORDER,
            "        "
            "        "
            "        "
            "   #####"
            "   #####"
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('┐', BORDER,
            "        "
            "        "
            "        "
            "#####   "
            "#####   "
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('└', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "   #####"
            "   #####"
            "        "
            "        "
            "        "),
        sym!('┘', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "#####   "
            "#####   "
            "        "
            "        "
            "        "),
        sym!('├', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "   #####"
            "   #####"
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('┤', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "#####   "
            "#####   "
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('┬', BORDER,
            "        "
            "        "
            "        "
            "########"
            "########"
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('┴', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "########"
            "########"
            "        "
            "        "
            "        "),
        sym!('┼', BORDER,
            "   ##   "
            "   ##   "
            "   ##   "
            "########"
            "########"
            "   ##   "
            "   ##   "
            "   ##   "),
        sym!('╱', DIAGONAL,
            "      ##"
            "     ## "
            "    ##  "
            "   ##   "
            "  ##    "
            " ##     "
            "##      "
            "#       "),
        sym!('╲', DIAGONAL,
            "##      "
            " ##     "
            "  ##    "
            "   ##   "
            "    ##  "
            "     ## "
            "      ##"
            "       #"),
        sym!('╳', DIAGONAL,
            "##    ##"
            " ##  ## "
            "  ####  "
            "   ##   "
            "  ####  "
            " ##  ## "
            "##    ##"
            "#      #"),
        sym!('·', DOT,
            "        "
            "        "
            "        "
            "   ##   "
            "   ##   "
            "        "
            "        "
            "        "),
        sym!('•', DOT | GEOMETRIC | AMBIGUOUS,
            "        "
            "        "
            "  ####  "
            " ###### "
            " ###### "
            "  ####  "
            "        "
            "        "),
        sym!('●', DOT | GEOMETRIC | AMBIGUOUS,
            "  ####  "
            " ###### "
            "########"
            "########"
            "########"
            "########"
            " ###### "
            "  ####  "),
        sym!('○', DOT | GEOMETRIC | AMBIGUOUS,
            "  ####  "
            " ##  ## "
            "##    ##"
            "##    ##"
            "##    ##"
            "##    ##"
            " ##  ## "
            "  ####  "),
        sym!('■', GEOMETRIC | AMBIGUOUS,
            "        "
            " ###### "
            " ###### "
            " ###### "
            " ###### "
            " ###### "
            " ###### "
            "        "),
        sym!('□', GEOMETRIC | AMBIGUOUS,
            "        "
            " ###### "
            " ##  ## "
            " ##  ## "
            " ##  ## "
            " ##  ## "
            " ###### "
            "        "),
        sym!('▲', GEOMETRIC | AMBIGUOUS,
            "        "
            "   ##   "
            "  ####  "
            "  ####  "
            " ###### "
            " ###### "
            "########"
            "        "),
        sym!('▼', GEOMETRIC | AMBIGUOUS,
            "        "
            "########"
            " ###### "
            " ###### "
            "  ####  "
            "  ####  "
            "   ##   "
            "        "),
        sym!('◀', GEOMETRIC | AMBIGUOUS,
            "      ##"
            "    ####"
            "  ######"
            "########"
            "########"
            "  ######"
            "    ####"
            "      ##"),
        sym!('▶', GEOMETRIC | AMBIGUOUS,
            "##      "
            "####    "
            "######  "
            "########"
            "########"
            "######  "
            "####    "
            "##      "),
        sym!('◆', GEOMETRIC | AMBIGUOUS,
            "   ##   "
            "  ####  "
            " ###### "
            "########"
            "########"
            " ###### "
            "  ####  "
            "   ##   "),
        sym!('◢', WEDGE | GEOMETRIC | UGLY,
            "       #"
            "      ##"
            "    ####"
            "   #####"
            "  ######"
            " #######"
            "########"
            "########"),
        sym!('◣', WEDGE | GEOMETRIC | UGLY,
            "#       "
            "##      "
            "####    "
            "#####   "
            "######  "
            "####### "
            "########"
            "########"),
        sym!('◤', WEDGE | GEOMETRIC | UGLY,
            "########"
            "########"
            "####### "
            "######  "
            "#####   "
            "####    "
            "##      "
            "#       "),
        sym!('◥', WEDGE | GEOMETRIC | UGLY,
            "########"
            "########"
            " #######"
            "  ######"
            "   #####"
            "    ####"
            "      ##"
            "       #"),
        sym!('⎺', TECHNICAL,
            "########"
            "########"
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "),
        sym!('⎻', TECHNICAL,
            "        "
            "########"
            "########"
            "        "
            "        "
            "        "
            "        "
            "        "),
        sym!('⎼', TECHNICAL,
            "        "
            "        "
            "        "
            "        "
            "        "
            "########"
            "########"
            "        "),
        sym!('⎽', TECHNICAL,
            "        "
            "        "
            "        "
            "        "
            "        "
            "        "
            "########"
            "########"),
    ]
}

// ── ASCII ───────────────────────────────────────────────────────────────

#[rustfmt::skip]
fn ascii_defs() -> Vec<Def> {
    use tag::*;
    let a = ASCII;
    let al = ASCII | ALPHA | LATIN;
    let d = ASCII | DIGIT;
    vec![
        sym!('!', a, "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "        " "   ##   " "        "),
        sym!('"', a, " ##  ## " " ##  ## " " ##  ## " "        " "        " "        " "        " "        "),
        sym!('#', a, " ##  ## " "########" " ##  ## " " ##  ## " " ##  ## " "########" " ##  ## " "        "),
        sym!('$', a, "   ##   " " ###### " "##      " " ###### " "      ##" " ###### " "   ##   " "        "),
        sym!('%', a, "##    ##" "##   ## " "    ##  " "   ##   " "  ##    " " ##   ##" "##    ##" "        "),
        sym!('&', a, "  ###   " " ##  ## " "  ###   " " ###  ##" "##  ### " "##   ## " " ###  ##" "        "),
        sym!('\'', a, "   ##   " "   ##   " "   ##   " "        " "        " "        " "        " "        "),
        sym!('(', a, "    ##  " "   ##   " "  ##    " "  ##    " "  ##    " "   ##   " "    ##  " "        "),
        sym!(')', a, "  ##    " "   ##   " "    ##  " "    ##  " "    ##  " "   ##   " "  ##    " "        "),
        sym!('*', a, "        " " ##  ## " "  ####  " "########" "  ####  " " ##  ## " "        " "        "),
        sym!('+', a, "        " "   ##   " "   ##   " "########" "   ##   " "   ##   " "        " "        "),
        sym!(',', a, "        " "        " "        " "        " "        " "   ##   " "   ##   " "  ##    "),
        sym!('-', a, "        " "        " "        " "########" "        " "        " "        " "        "),
        sym!('.', a, "        " "        " "        " "        " "        " "   ##   " "   ##   " "        "),
        sym!('/', a, "      ##" "     ## " "    ##  " "   ##   " "  ##    " " ##     " "##      " "        "),
        sym!('0', d, " ###### " "##    ##" "##   ###" "## ## ##" "###   ##" "##    ##" " ###### " "        "),
        sym!('1', d, "   ##   " "  ###   " "   ##   " "   ##   " "   ##   " "   ##   " " ###### " "        "),
        sym!('2', d, " ###### " "##    ##" "      ##" "   #### " "  ##    " "##      " "########" "        "),
        sym!('3', d, " ###### " "##    ##" "      ##" "   #### " "      ##" "##    ##" " ###### " "        "),
        sym!('4', d, "    ### " "   #### " "  ## ## " " ##  ## " "########" "     ## " "     ## " "        "),
        sym!('5', d, "########" "##      " "####### " "      ##" "      ##" "##    ##" " ###### " "        "),
        sym!('6', d, " ###### " "##      " "####### " "##    ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('7', d, "########" "      ##" "     ## " "    ##  " "   ##   " "   ##   " "   ##   " "        "),
        sym!('8', d, " ###### " "##    ##" "##    ##" " ###### " "##    ##" "##    ##" " ###### " "        "),
        sym!('9', d, " ###### " "##    ##" "##    ##" " #######" "      ##" "      ##" " ###### " "        "),
        sym!(':', a, "        " "   ##   " "   ##   " "        " "   ##   " "   ##   " "        " "        "),
        sym!(';', a, "        " "   ##   " "   ##   " "        " "   ##   " "   ##   " "  ##    " "        "),
        sym!('<', a, "     ## " "    ##  " "   ##   " "  ##    " "   ##   " "    ##  " "     ## " "        "),
        sym!('=', a, "        " "        " "########" "        " "########" "        " "        " "        "),
        sym!('>', a, " ##     " "  ##    " "   ##   " "    ##  " "   ##   " "  ##    " " ##     " "        "),
        sym!('?', a, " ###### " "##    ##" "      ##" "    ### " "   ##   " "        " "   ##   " "        "),
        sym!('@', a, " ###### " "##    ##" "## ### #" "## ## ##" "## #####" "##      " " ###### " "        "),
        sym!('A', al, "   ##   " "  ####  " " ##  ## " "##    ##" "########" "##    ##" "##    ##" "        "),
        sym!('B', al, "####### " "##    ##" "##    ##" "####### " "##    ##" "##    ##" "####### " "        "),
        sym!('C', al, " ###### " "##    ##" "##      " "##      " "##      " "##    ##" " ###### " "        "),
        sym!('D', al, "####### " "##    ##" "##    ##" "##    ##" "##    ##" "##    ##" "####### " "        "),
        sym!('E', al, "########" "##      " "##      " "######  " "##      " "##      " "########" "        "),
        sym!('F', al, "########" "##      " "##      " "######  " "##      " "##      " "##      " "        "),
        sym!('G', al, " ###### " "##    ##" "##      " "##  ####" "##    ##" "##    ##" " ###### " "        "),
        sym!('H', al, "##    ##" "##    ##" "##    ##" "########" "##    ##" "##    ##" "##    ##" "        "),
        sym!('I', al, " ###### " "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " " ###### " "        "),
        sym!('J', al, "      ##" "      ##" "      ##" "      ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('K', al, "##   ## " "##  ##  " "## ##   " "####    " "## ##   " "##  ##  " "##   ## " "        "),
        sym!('L', al, "##      " "##      " "##      " "##      " "##      " "##      " "########" "        "),
        sym!('M', al, "##    ##" "###  ###" "## ## ##" "## ## ##" "##    ##" "##    ##" "##    ##" "        "),
        sym!('N', al, "##    ##" "###   ##" "####  ##" "## ## ##" "##  ####" "##   ###" "##    ##" "        "),
        sym!('O', al, " ###### " "##    ##" "##    ##" "##    ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('P', al, "####### " "##    ##" "##    ##" "####### " "##      " "##      " "##      " "        "),
        sym!('Q', al, " ###### " "##    ##" "##    ##" "##    ##" "## ## ##" "##  ### " " ### ## " "        "),
        sym!('R', al, "####### " "##    ##" "##    ##" "####### " "## ##   " "##  ##  " "##   ## " "        "),
        sym!('S', al, " ###### " "##    ##" "##      " " ###### " "      ##" "##    ##" " ###### " "        "),
        sym!('T', al, "########" "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "        "),
        sym!('U', al, "##    ##" "##    ##" "##    ##" "##    ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('V', al, "##    ##" "##    ##" "##    ##" " ##  ## " " ##  ## " "  ####  " "   ##   " "        "),
        sym!('W', al, "##    ##" "##    ##" "##    ##" "## ## ##" "## ## ##" "###  ###" "##    ##" "        "),
        sym!('X', al, "##    ##" " ##  ## " "  ####  " "   ##   " "  ####  " " ##  ## " "##    ##" "        "),
        sym!('Y', al, "##    ##" " ##  ## " "  ####  " "   ##   " "   ##   " "   ##   " "   ##   " "        "),
        sym!('Z', al, "########" "     ## " "    ##  " "   ##   " "  ##    " " ##     " "########" "        "),
        sym!('[', a, "  ####  " "  ##    " "  ##    " "  ##    " "  ##    " "  ##    " "  ####  " "        "),
        sym!('\\', a, "##      " " ##     " "  ##    " "   ##   " "    ##  " "     ## " "      ##" "        "),
        sym!(']', a, "  ####  " "    ##  " "    ##  " "    ##  " "    ##  " "    ##  " "  ####  " "        "),
        sym!('^', a, "   ##   " "  ####  " " ##  ## " "##    ##" "        " "        " "        " "        "),
        sym!('_', a, "        " "        " "        " "        " "        " "        " "        " "########"),
        sym!('`', a, "  ##    " "   ##   " "    ##  " "        " "        " "        " "        " "        "),
        sym!('a', al, "        " "        " " ###### " "      ##" " #######" "##    ##" " #######" "        "),
        sym!('b', al, "##      " "##      " "####### " "##    ##" "##    ##" "##    ##" "####### " "        "),
        sym!('c', al, "        " "        " " ###### " "##      " "##      " "##      " " ###### " "        "),
        sym!('d', al, "      ##" "      ##" " #######" "##    ##" "##    ##" "##    ##" " #######" "        "),
        sym!('e', al, "        " "        " " ###### " "##    ##" "########" "##      " " ###### " "        "),
        sym!('f', al, "   #### " "  ##    " " ###### " "  ##    " "  ##    " "  ##    " "  ##    " "        "),
        sym!('g', al, "        " "        " " #######" "##    ##" " #######" "      ##" " ###### " "        "),
        sym!('h', al, "##      " "##      " "####### " "##    ##" "##    ##" "##    ##" "##    ##" "        "),
        sym!('i', al, "   ##   " "        " "  ###   " "   ##   " "   ##   " "   ##   " " ###### " "        "),
        sym!('j', al, "     ## " "        " "    ### " "     ## " "     ## " "##   ## " " #####  " "        "),
        sym!('k', al, "##      " "##      " "##  ##  " "## ##   " "####    " "## ##   " "##  ##  " "        "),
        sym!('l', al, "  ###   " "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " " ###### " "        "),
        sym!('m', al, "        " "        " "###  ## " "## ## ##" "## ## ##" "## ## ##" "##    ##" "        "),
        sym!('n', al, "        " "        " "####### " "##    ##" "##    ##" "##    ##" "##    ##" "        "),
        sym!('o', al, "        " "        " " ###### " "##    ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('p', al, "        " "        " "####### " "##    ##" "####### " "##      " "##      " "        "),
        sym!('q', al, "        " "        " " #######" "##    ##" " #######" "      ##" "      ##" "        "),
        sym!('r', al, "        " "        " "## #### " "###     " "##      " "##      " "##      " "        "),
        sym!('s', al, "        " "        " " #######" "##      " " ###### " "      ##" "####### " "        "),
        sym!('t', al, "  ##    " "  ##    " "######  " "  ##    " "  ##    " "  ##    " "   #### " "        "),
        sym!('u', al, "        " "        " "##    ##" "##    ##" "##    ##" "##    ##" " ###### " "        "),
        sym!('v', al, "        " "        " "##    ##" "##    ##" " ##  ## " "  ####  " "   ##   " "        "),
        sym!('w', al, "        " "        " "##    ##" "## ## ##" "## ## ##" "## ## ##" " ##  ## " "        "),
        sym!('x', al, "        " "        " "##    ##" " ##  ## " "  ####  " " ##  ## " "##    ##" "        "),
        sym!('y', al, "        " "        " "##    ##" "##    ##" " #######" "      ##" " ###### " "        "),
        sym!('z', al, "        " "        " "########" "    ##  " "   ##   " "  ##    " "########" "        "),
        sym!('{', a, "    ### " "   ##   " "   ##   " " ###    " "   ##   " "   ##   " "    ### " "        "),
        sym!('|', a, "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "   ##   " "        "),
        sym!('}', a, " ###    " "   ##   " "   ##   " "    ### " "   ##   " "   ##   " " ###    " "        "),
        sym!('~', a, "        " " ###  ##" "## ### #" "        " "        " "        " "        " "        "),
    ]
}

// ── Generated ranges ────────────────────────────────────────────────────

/// Braille patterns U+2800..=U+28FF. Dot k maps to a 2-column, 4-row
/// grid; each raised dot inks a 4×2 pixel patch.
fn braille_symbols(out: &mut Vec<Symbol>) {
    // (bit, col, row) per the Braille encoding: dots 1-3 and 7 in the left
    // column, 4-6 and 8 in the right.
    const DOTS: [(u32, usize, usize); 8] = [
        (0, 0, 0),
        (1, 0, 1),
        (2, 0, 2),
        (3, 1, 0),
        (4, 1, 1),
        (5, 1, 2),
        (6, 0, 3),
        (7, 1, 3),
    ];

    for pattern in 0u32..256 {
        let ch = char::from_u32(0x2800 + pattern).expect("braille code point");
        let mut bits = 0u64;
        for &(bit, col, row) in &DOTS {
            if pattern & (1 << bit) != 0 {
                fill_rect(&mut bits, col * 4, col * 4 + 4, row * 2, row * 2 + 2);
            }
        }
        out.push(Symbol {
            ch,
            tags: tag::BRAILLE | tag::EXTRA | width_tag(ch),
            coverage: Coverage::Narrow(bits),
        });
    }
}

/// Block sextants U+1FB00..=U+1FB3B: all 2×3 fill patterns except empty,
/// full, and the two half blocks that already exist elsewhere.
fn sextant_symbols(out: &mut Vec<Symbol>) {
    const ROW_BOUNDS: [(usize, usize); 3] = [(0, 3), (3, 6), (6, 8)];

    let mut cp = 0x1FB00u32;
    for pattern in 1u32..=62 {
        // 21 = left half (U+258C), 42 = right half (U+2590); skipped in the
        // Unicode encoding.
        if pattern == 21 || pattern == 42 {
            continue;
        }
        let ch = char::from_u32(cp).expect("sextant code point");
        cp += 1;

        let mut bits = 0u64;
        for cell in 0..6 {
            if pattern & (1 << cell) != 0 {
                let col = cell % 2;
                let row = cell / 2;
                let (y0, y1) = ROW_BOUNDS[row];
                fill_rect(&mut bits, col * 4, col * 4 + 4, y0, y1);
            }
        }
        out.push(Symbol {
            ch,
            tags: tag::SEXTANT | tag::LEGACY | width_tag(ch),
            coverage: Coverage::Narrow(bits),
        });
    }
}

fn build_table() -> Vec<Symbol> {
    let mut out = Vec::with_capacity(600);

    // Art-defined glyphs default to NARROW: many of them sit in
    // East-Asian-Ambiguous ranges (block elements, box drawing) yet render
    // single-cell on the terminals we target. Definitions that really are
    // problematic carry an explicit AMBIGUOUS tag instead.
    for def in block_defs()
        .into_iter()
        .chain(line_defs())
        .chain(ascii_defs())
    {
        let width_bits = def.tags & (tag::NARROW | tag::WIDE | tag::AMBIGUOUS);
        let tags = if width_bits != 0 {
            def.tags
        } else {
            def.tags | tag::NARROW
        };
        out.push(Symbol {
            ch: def.ch,
            tags,
            coverage: Coverage::Narrow(bitmap_from_art(def.rows)),
        });
    }

    braille_symbols(&mut out);
    sextant_symbols(&mut out);
    out
}

/// The builtin symbol table, built once per process.
pub fn builtin() -> &'static [Symbol] {
    use std::sync::OnceLock;
    static TABLE: OnceLock<Vec<Symbol>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

pub fn builtin_lookup(ch: char) -> Option<&'static Symbol> {
    builtin().iter().find(|s| s.ch == ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_symbol_has_exactly_one_width_tag() {
        for sym in builtin() {
            let w = sym.tags & (tag::NARROW | tag::WIDE | tag::AMBIGUOUS);
            assert_eq!(
                w.count_ones(),
                1,
                "symbol {:?} has width tags {:#x}",
                sym.ch,
                w
            );
        }
    }

    #[test]
    fn no_duplicate_code_points() {
        let mut seen = std::collections::HashSet::new();
        for sym in builtin() {
            assert!(seen.insert(sym.ch), "duplicate symbol {:?}", sym.ch);
        }
    }

    #[test]
    fn coverage_extremes() {
        assert_eq!(
            builtin_lookup(' ').unwrap().coverage,
            Coverage::Narrow(0)
        );
        assert_eq!(
            builtin_lookup('█').unwrap().coverage,
            Coverage::Narrow(u64::MAX)
        );
    }

    #[test]
    fn half_blocks_cover_half() {
        for ch in ['▀', '▄', '▌', '▐'] {
            assert_eq!(builtin_lookup(ch).unwrap().coverage.popcount(), 32);
        }
    }

    #[test]
    fn braille_full_and_empty() {
        let blank = builtin_lookup('\u{2800}').unwrap();
        assert_eq!(blank.coverage.popcount(), 0);
        let full = builtin_lookup('\u{28FF}').unwrap();
        assert_eq!(full.coverage.popcount(), 64);
    }

    #[test]
    fn sextant_range_is_complete() {
        let count = builtin()
            .iter()
            .filter(|s| s.tags & tag::SEXTANT != 0)
            .count();
        assert_eq!(count, 60);
        // First sextant inks only the top-left cell: 4 wide, 3 tall.
        let first = builtin_lookup('\u{1FB00}').unwrap();
        assert_eq!(first.coverage.popcount(), 12);
    }

    #[test]
    fn ascii_letters_are_tagged() {
        let a = builtin_lookup('a').unwrap();
        assert!(a.tags & tag::ALPHA != 0);
        assert!(a.tags & tag::ASCII != 0);
        let seven = builtin_lookup('7').unwrap();
        assert!(seven.tags & tag::DIGIT != 0);
    }
}
