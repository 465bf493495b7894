//! Symbol maps: the selected working alphabet, compiled for fast matching.
//!
//! A map starts empty and is edited by tags, code-point ranges, or a
//! selector string. User glyph bitmaps can be registered on top of (or
//! instead of) the builtin table. Compilation quantizes every selected
//! glyph to its coverage bitmap and sorts candidates by (popcount, bitmap),
//! the order the canvas matcher scans in.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use crate::canvas::config::PixelType;
use crate::color::luminance_u8;
use crate::error::{Error, Result};
use crate::symbols::{self, tag, width_tag, Coverage, Tags};

/// A compiled match candidate. Wide glyphs keep their two cell halves.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub ch: char,
    pub coverage: Coverage,
    pub popcount: u32,
    pub tags: Tags,
}

/// Compiled form of a symbol map: narrow and wide candidates, each sorted
/// by popcount then bitmap value.
#[derive(Debug, Default)]
pub struct Compiled {
    pub narrow: Vec<Candidate>,
    pub wide: Vec<Candidate>,
}

impl Compiled {
    pub fn len(&self) -> usize {
        self.narrow.len() + self.wide.len()
    }

    pub fn is_empty(&self) -> bool {
        self.narrow.is_empty() && self.wide.is_empty()
    }
}

#[derive(Debug, Clone)]
struct UserGlyph {
    /// Canonical RGBA8 unassociated copy of the caller's pixels.
    pixels: Vec<u8>,
    width: usize,
    height: usize,
    coverage: Coverage,
}

pub struct SymbolMap {
    selected: BTreeSet<char>,
    user: BTreeMap<char, UserGlyph>,
    allow_builtin: bool,
    compiled: OnceLock<Arc<Compiled>>,
}

impl Clone for SymbolMap {
    fn clone(&self) -> Self {
        let compiled = OnceLock::new();
        if let Some(c) = self.compiled.get() {
            let _ = compiled.set(Arc::clone(c));
        }
        Self {
            selected: self.selected.clone(),
            user: self.user.clone(),
            allow_builtin: self.allow_builtin,
            compiled,
        }
    }
}

impl std::fmt::Debug for SymbolMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolMap")
            .field("selected", &self.selected.len())
            .field("user", &self.user.len())
            .field("allow_builtin", &self.allow_builtin)
            .finish()
    }
}

impl SymbolMap {
    /// An empty map. Note that the space glyph is always available to the
    /// matcher as the uninked fallback, selected or not.
    pub fn new() -> Self {
        Self {
            selected: BTreeSet::new(),
            user: BTreeMap::new(),
            allow_builtin: true,
            compiled: OnceLock::new(),
        }
    }

    fn touch(&mut self) {
        self.compiled = OnceLock::new();
    }

    fn tags_of(&self, ch: char) -> Tags {
        if let Some(sym) = symbols::builtin_lookup(ch) {
            sym.tags
        } else {
            width_tag(ch)
        }
    }

    pub fn selected_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.selected.iter().copied()
    }

    pub fn contains(&self, ch: char) -> bool {
        self.selected.contains(&ch)
    }

    pub fn allow_builtin(&self) -> bool {
        self.allow_builtin
    }

    pub fn set_allow_builtin(&mut self, allow: bool) {
        self.allow_builtin = allow;
        self.touch();
    }

    pub fn add_by_tags(&mut self, tags: Tags) {
        for sym in symbols::builtin() {
            if sym.tags & tags != 0 {
                self.selected.insert(sym.ch);
            }
        }
        let user_chars: Vec<char> = self.user.keys().copied().collect();
        for ch in user_chars {
            if self.tags_of(ch) & tags != 0 {
                self.selected.insert(ch);
            }
        }
        self.touch();
    }

    pub fn remove_by_tags(&mut self, tags: Tags) {
        let to_remove: Vec<char> = self
            .selected
            .iter()
            .copied()
            .filter(|&ch| self.tags_of(ch) & tags != 0)
            .collect();
        for ch in to_remove {
            self.selected.remove(&ch);
        }
        self.touch();
    }

    /// Selects every known glyph whose code point falls in `first..=last`.
    pub fn add_by_range(&mut self, first: char, last: char) {
        for sym in symbols::builtin() {
            if sym.ch >= first && sym.ch <= last {
                self.selected.insert(sym.ch);
            }
        }
        let user_chars: Vec<char> = self.user.keys().copied().collect();
        for ch in user_chars {
            if ch >= first && ch <= last {
                self.selected.insert(ch);
            }
        }
        self.touch();
    }

    pub fn remove_by_range(&mut self, first: char, last: char) {
        self.selected.retain(|&ch| ch < first || ch > last);
        self.touch();
    }

    /// Applies a selector expression.
    ///
    /// Terms are separated by commas or by an explicit `+`/`-` sign. Each
    /// term is a tag name, a hex code point, a range `LO..HI`, or a literal
    /// character list `[chars]`. An unsigned first term replaces the
    /// current selection; later unsigned terms inherit the last sign.
    pub fn apply_selectors(&mut self, selectors: &str) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Op {
            Set,
            Add,
            Remove,
        }

        let mut op = Op::Set;
        let mut rest = selectors.trim();

        while !rest.is_empty() {
            rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            if rest.is_empty() {
                break;
            }
            if let Some(r) = rest.strip_prefix('+') {
                op = Op::Add;
                rest = r;
                continue;
            }
            if let Some(r) = rest.strip_prefix('-') {
                op = Op::Remove;
                rest = r;
                continue;
            }

            // Take one term: a bracketed list, or text up to the next
            // separator.
            let term;
            if let Some(r) = rest.strip_prefix('[') {
                let end = r
                    .find(']')
                    .ok_or_else(|| Error::InvalidSelector(rest.to_string()))?;
                term = &rest[..end + 2];
                rest = &r[end + 1..];
            } else {
                let end = rest
                    .find(|c: char| c == ',' || c == '+' || c == '-')
                    .unwrap_or(rest.len());
                term = &rest[..end];
                rest = &rest[end..];
            }

            if op == Op::Set {
                self.selected.clear();
            }
            let add = op != Op::Remove;
            self.apply_term(term.trim(), add)?;
            if op == Op::Set {
                op = Op::Add;
            }
        }

        self.touch();
        Ok(())
    }

    fn apply_term(&mut self, term: &str, add: bool) -> Result<()> {
        if term.is_empty() {
            return Err(Error::InvalidSelector(String::new()));
        }

        // Literal character list: "[ a]" selects space and 'a'.
        if let Some(inner) = term.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            for ch in inner.chars() {
                if add {
                    self.selected.insert(ch);
                } else {
                    self.selected.remove(&ch);
                }
            }
            return Ok(());
        }

        if let Some(tags) = tag::by_name(term) {
            if add {
                self.add_by_tags(tags);
            } else {
                self.remove_by_tags(tags);
            }
            return Ok(());
        }

        // Range LO..HI or a single hex code point, with optional 0x/U+.
        let parse_cp = |s: &str| -> Option<char> {
            let s = s
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X")
                .trim_start_matches("U+")
                .trim_start_matches("u+");
            u32::from_str_radix(s, 16).ok().and_then(char::from_u32)
        };

        if let Some((lo, hi)) = term.split_once("..") {
            let (lo, hi) = match (parse_cp(lo), parse_cp(hi)) {
                (Some(l), Some(h)) if l <= h => (l, h),
                _ => return Err(Error::InvalidSelector(term.to_string())),
            };
            if add {
                self.add_by_range(lo, hi);
            } else {
                self.remove_by_range(lo, hi);
            }
            return Ok(());
        }

        if let Some(cp) = parse_cp(term) {
            if add {
                self.add_by_range(cp, cp);
            } else {
                self.remove_by_range(cp, cp);
            }
            return Ok(());
        }

        Err(Error::InvalidSelector(term.to_string()))
    }

    /// Registers a caller-supplied glyph bitmap for `ch` and selects it.
    /// The glyph is quantized to cell coverage by thresholding
    /// alpha-weighted luminance at the median across the cell.
    pub fn add_user_glyph(
        &mut self,
        ch: char,
        pixels: &[u8],
        format: PixelType,
        width: usize,
        height: usize,
        rowstride: usize,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::BadPixelBuffer("empty glyph".into()));
        }
        let bpp = format.bytes_per_pixel();
        if rowstride < width * bpp || pixels.len() < rowstride * height {
            return Err(Error::BadPixelBuffer(format!(
                "glyph buffer too small for {}x{} at rowstride {}",
                width, height, rowstride
            )));
        }

        let mut rgba = vec![0u8; width * height * 4];
        for y in 0..height {
            for x in 0..width {
                let src = &pixels[y * rowstride + x * bpp..];
                let px = format.read_rgba_unassociated(src);
                rgba[(y * width + x) * 4..(y * width + x) * 4 + 4].copy_from_slice(&px);
            }
        }

        let wide = width_tag(ch) == tag::WIDE;
        let cells_w = if wide { 16 } else { 8 };
        let luma = downsample_luma(&rgba, width, height, cells_w, 8);
        let bits = threshold_at_median(&luma);

        let coverage = if wide {
            let mut left = 0u64;
            let mut right = 0u64;
            for y in 0..8 {
                for x in 0..8 {
                    if bits[y * 16 + x] {
                        left |= 1u64 << (y * 8 + x);
                    }
                    if bits[y * 16 + x + 8] {
                        right |= 1u64 << (y * 8 + x);
                    }
                }
            }
            Coverage::Wide([left, right])
        } else {
            let mut b = 0u64;
            for (i, &on) in bits.iter().enumerate() {
                if on {
                    b |= 1u64 << i;
                }
            }
            Coverage::Narrow(b)
        };

        self.user.insert(
            ch,
            UserGlyph {
                pixels: rgba,
                width,
                height,
                coverage,
            },
        );
        self.selected.insert(ch);
        self.touch();
        Ok(())
    }

    /// Returns a copy of a registered user glyph's pixels in the requested
    /// format, plus its dimensions and rowstride.
    pub fn get_glyph(
        &self,
        ch: char,
        format: PixelType,
    ) -> Option<(Vec<u8>, usize, usize, usize)> {
        let glyph = self.user.get(&ch)?;
        let bpp = format.bytes_per_pixel();
        let rowstride = glyph.width * bpp;
        let mut out = vec![0u8; rowstride * glyph.height];
        for i in 0..glyph.width * glyph.height {
            let mut px = [0u8; 4];
            px.copy_from_slice(&glyph.pixels[i * 4..i * 4 + 4]);
            format.write_rgba_unassociated(&mut out[i * bpp..], px);
        }
        Some((out, glyph.width, glyph.height, rowstride))
    }

    fn coverage_of(&self, ch: char) -> Option<(Coverage, Tags)> {
        if let Some(user) = self.user.get(&ch) {
            return Some((user.coverage, width_tag(ch)));
        }
        if self.allow_builtin {
            if let Some(sym) = symbols::builtin_lookup(ch) {
                return Some((sym.coverage, sym.tags));
            }
        }
        None
    }

    /// Compiles (and memoizes) the candidate table. The result is reused
    /// until the map is mutated.
    pub fn compile(&self) -> Arc<Compiled> {
        Arc::clone(self.compiled.get_or_init(|| {
            let mut narrow = Vec::new();
            let mut wide = Vec::new();

            // Space is the implicit uninked fallback even when deselected.
            let mut chars = self.selected.clone();
            chars.insert(' ');

            for ch in chars {
                let Some((coverage, tags)) = self.coverage_of(ch) else {
                    continue;
                };
                let cand = Candidate {
                    ch,
                    coverage,
                    popcount: coverage.popcount(),
                    tags,
                };
                match coverage {
                    Coverage::Narrow(_) => narrow.push(cand),
                    Coverage::Wide(_) => wide.push(cand),
                }
            }

            let key = |c: &Candidate| match c.coverage {
                Coverage::Narrow(b) => (c.popcount, b, 0u64, c.ch),
                Coverage::Wide([l, r]) => (c.popcount, l, r, c.ch),
            };
            narrow.sort_by_key(key);
            wide.sort_by_key(key);

            Arc::new(Compiled { narrow, wide })
        }))
    }
}

impl Default for SymbolMap {
    /// The default working alphabet: everything except the extra and
    /// bad (ambiguous/ugly) categories.
    fn default() -> Self {
        let mut map = Self::new();
        map.add_by_tags(tag::ALL);
        map.remove_by_tags(tag::EXTRA);
        map.remove_by_tags(tag::BAD);
        map
    }
}

/// Box-average the alpha-weighted luminance of an RGBA8 buffer down to a
/// `tw`×`th` grid.
fn downsample_luma(rgba: &[u8], width: usize, height: usize, tw: usize, th: usize) -> Vec<f32> {
    let mut sums = vec![0.0f32; tw * th];
    let mut counts = vec![0u32; tw * th];

    for y in 0..height {
        let ty = (y * th / height).min(th - 1);
        for x in 0..width {
            let tx = (x * tw / width).min(tw - 1);
            let px = &rgba[(y * width + x) * 4..(y * width + x) * 4 + 4];
            let luma = luminance_u8([px[0], px[1], px[2]]) as f32 * px[3] as f32 / 255.0;
            sums[ty * tw + tx] += luma;
            counts[ty * tw + tx] += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { s / c as f32 } else { 0.0 })
        .collect()
}

/// Ink every sample strictly above the median. Uniform input quantizes to
/// a uniform (empty) bitmap, and symmetric input stays symmetric.
fn threshold_at_median(luma: &[f32]) -> Vec<bool> {
    let mut sorted: Vec<f32> = luma.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = sorted[(sorted.len() - 1) / 2];
    luma.iter().map(|&v| v > median).collect()
}
