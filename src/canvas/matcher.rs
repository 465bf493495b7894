//! Per-cell symbol matching: choose the (glyph, fg, bg) triple that best
//! reconstructs each cell of the work buffer.

use crate::canvas::config::{CanvasConfig, CanvasMode, ColorExtractor};
use crate::canvas::resample::WorkPixel;
use crate::color::{rgb_to_working, ColorSpace};
use crate::symbols::{Candidate, Compiled, Coverage};

pub const CELL_W: usize = 8;
pub const CELL_H: usize = 8;
const CELL_PIXELS: usize = CELL_W * CELL_H;

/// Weight applied to squared alpha mismatch (alpha in 0..1) so that a
/// fully-wrong alpha costs about as much as a fully-wrong color channel.
const ALPHA_PENALTY: f32 = 10_000.0;

/// Outcome of matching one cell (or a two-cell window for wide glyphs).
#[derive(Debug, Clone, Copy)]
pub struct CellMatch {
    pub ch: char,
    pub coverage: Coverage,
    pub error: f32,
    /// Mean fg/bg in working space, plus mean partition alpha (0..1).
    pub fg: [f32; 3],
    pub bg: [f32; 3],
    pub fg_alpha: f32,
    pub bg_alpha: f32,
    pub inverted: bool,
}

/// Pre-digested cell pixels: working-space colors, alphas, and the
/// aggregate terms the error expansion needs.
pub struct CellSource {
    colors: Vec<[f32; 3]>,
    alphas: Vec<f32>,
    sum: [f32; 3],
    sum_sq: f32,
    sum_alpha: f32,
    sum_alpha_sq: f32,
    /// Coverage bitmap of the tile itself: luminance above the tile
    /// median. Used for work-factor banding and Hamming tie-breaks.
    pub quantized: u64,
    /// Mean squared deviation per pixel (color variance).
    pub variance: f32,
}

impl CellSource {
    /// Digests `n` work-buffer pixels (64 for a cell, 128 for a wide
    /// window) already mapped to working space.
    pub fn new(colors: Vec<[f32; 3]>, alphas: Vec<f32>) -> Self {
        let n = colors.len();
        debug_assert!(n == CELL_PIXELS || n == CELL_PIXELS * 2);

        let mut sum = [0.0f32; 3];
        let mut sum_sq = 0.0f32;
        let mut sum_alpha = 0.0f32;
        let mut sum_alpha_sq = 0.0f32;
        for (c, &a) in colors.iter().zip(&alphas) {
            for k in 0..3 {
                sum[k] += c[k];
            }
            sum_sq += c[0] * c[0] + c[1] * c[1] + c[2] * c[2];
            sum_alpha += a;
            sum_alpha_sq += a * a;
        }

        let mean = [sum[0] / n as f32, sum[1] / n as f32, sum[2] / n as f32];
        let mean_sq = mean[0] * mean[0] + mean[1] * mean[1] + mean[2] * mean[2];
        let variance = (sum_sq / n as f32 - mean_sq).max(0.0);

        // Tile's own coverage: brightness above the tile median. Only the
        // first 64 pixels participate for wide windows (the banding and
        // Hamming heuristics stay per-cell).
        let mut luma: Vec<f32> = colors
            .iter()
            .take(CELL_PIXELS)
            .map(|c| c[0] + c[1] + c[2])
            .collect();
        let quantized = {
            let mut sorted = luma.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = sorted[(sorted.len() - 1) / 2];
            let mut bits = 0u64;
            for (i, &v) in luma.iter().enumerate() {
                if v > median {
                    bits |= 1 << i;
                }
            }
            bits
        };
        luma.clear();

        Self {
            colors,
            alphas,
            sum,
            sum_sq,
            sum_alpha,
            sum_alpha_sq,
            quantized,
            variance,
        }
    }

    pub fn from_work(
        work: &[WorkPixel],
        row_px: usize,
        x0: usize,
        y0: usize,
        cells: usize,
        space: ColorSpace,
        err: Option<&[[f32; 3]]>,
    ) -> Self {
        let n = CELL_PIXELS * cells;
        let mut colors = Vec::with_capacity(n);
        let mut alphas = Vec::with_capacity(n);

        for cy in 0..CELL_H {
            for cx in 0..CELL_W * cells {
                let idx = (y0 + cy) * row_px + x0 + cx;
                let px = work[idx];
                let rgb = [px[0] as u8, px[1] as u8, px[2] as u8];
                let mut c = rgb_to_working(rgb, space);
                if let Some(err) = err {
                    for k in 0..3 {
                        c[k] += err[idx][k];
                    }
                }
                colors.push(c);
                alphas.push(px[3] / 255.0);
            }
        }

        Self::new(colors, alphas)
    }

    pub fn pixel(&self, i: usize) -> ([f32; 3], f32) {
        (self.colors[i], self.alphas[i])
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    fn mean(&self) -> [f32; 3] {
        let n = self.len() as f32;
        [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n]
    }

    fn mean_alpha(&self) -> f32 {
        self.sum_alpha / self.len() as f32
    }
}

/// Iterate the set-bit pixel indices of a coverage bitmap over this
/// source (wide coverage maps the right half to indexes 64..128 of the
/// window's pixel order is row-interleaved, so translate).
fn covered_indices(coverage: Coverage, out: &mut Vec<usize>) {
    out.clear();
    match coverage {
        Coverage::Narrow(bits) => {
            let mut b = bits;
            while b != 0 {
                out.push(b.trailing_zeros() as usize);
                b &= b - 1;
            }
        }
        Coverage::Wide([l, r]) => {
            for (half, bits) in [(0usize, l), (1, r)] {
                let mut b = bits;
                while b != 0 {
                    let i = b.trailing_zeros() as usize;
                    let (y, x) = (i / CELL_W, i % CELL_W);
                    out.push(y * CELL_W * 2 + half * CELL_W + x);
                    b &= b - 1;
                }
            }
        }
    }
}

/// Σ|src−p|² over a set of indices, expanded so only sums are needed.
fn partition_error(sum: [f32; 3], sum_sq: f32, n: f32, p: [f32; 3]) -> f32 {
    let p_sq = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
    sum_sq - 2.0 * (p[0] * sum[0] + p[1] * sum[1] + p[2] * sum[2]) + n * p_sq
}

fn alpha_error(sum_a: f32, sum_a_sq: f32, n: f32, pa: f32) -> f32 {
    (sum_a_sq - 2.0 * pa * sum_a + n * pa * pa) * ALPHA_PENALTY
}

fn median_of(mut vals: Vec<f32>) -> f32 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    vals[(vals.len() - 1) / 2]
}

struct Evaluated {
    error: f32,
    fg: [f32; 3],
    bg: [f32; 3],
    fg_alpha: f32,
    bg_alpha: f32,
}

/// Matching strategy for one cell, parameterized by whether the colors are
/// free (truecolor/indexed) or pinned to the configured defaults (FGBG
/// family).
pub struct Matcher<'a> {
    pub config: &'a CanvasConfig,
    pub fixed_fg: [f32; 3],
    pub fixed_bg: [f32; 3],
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a CanvasConfig) -> Self {
        let space = config.color_space();
        Self {
            config,
            fixed_fg: rgb_to_working(config.fg_rgb(), space),
            fixed_bg: rgb_to_working(config.bg_rgb(), space),
        }
    }

    fn fixed_colors(&self) -> bool {
        matches!(
            self.config.canvas_mode(),
            CanvasMode::FgBg | CanvasMode::FgBgBgFg
        )
    }

    fn evaluate(
        &self,
        src: &CellSource,
        covered: &[usize],
        swap: bool,
    ) -> Evaluated {
        let n = src.len() as f32;
        let n_cov = covered.len() as f32;
        let n_unc = n - n_cov;

        // Covered partition sums.
        let mut cov_sum = [0.0f32; 3];
        let mut cov_sq = 0.0f32;
        let mut cov_a = 0.0f32;
        let mut cov_a_sq = 0.0f32;
        for &i in covered {
            let (c, a) = src.pixel(i);
            for k in 0..3 {
                cov_sum[k] += c[k];
            }
            cov_sq += c[0] * c[0] + c[1] * c[1] + c[2] * c[2];
            cov_a += a;
            cov_a_sq += a * a;
        }
        let unc_sum = [
            src.sum[0] - cov_sum[0],
            src.sum[1] - cov_sum[1],
            src.sum[2] - cov_sum[2],
        ];
        let unc_sq = src.sum_sq - cov_sq;
        let unc_a = src.sum_alpha - cov_a;
        let unc_a_sq = src.sum_alpha_sq - cov_a_sq;

        let (fg, bg, fg_alpha, bg_alpha);
        if self.fixed_colors() {
            let (f, b) = if swap {
                (self.fixed_bg, self.fixed_fg)
            } else {
                (self.fixed_fg, self.fixed_bg)
            };
            fg = f;
            bg = b;
            fg_alpha = 1.0;
            bg_alpha = 1.0;
        } else {
            match self.config.color_extractor() {
                ColorExtractor::Average => {
                    fg = if n_cov > 0.0 {
                        [cov_sum[0] / n_cov, cov_sum[1] / n_cov, cov_sum[2] / n_cov]
                    } else {
                        src.mean()
                    };
                    bg = if n_unc > 0.0 {
                        [unc_sum[0] / n_unc, unc_sum[1] / n_unc, unc_sum[2] / n_unc]
                    } else {
                        src.mean()
                    };
                    fg_alpha = if n_cov > 0.0 { cov_a / n_cov } else { src.mean_alpha() };
                    bg_alpha = if n_unc > 0.0 { unc_a / n_unc } else { src.mean_alpha() };
                }
                ColorExtractor::Median => {
                    let mut cov_ch: [Vec<f32>; 3] = Default::default();
                    let mut unc_ch: [Vec<f32>; 3] = Default::default();
                    let mut cov_al = Vec::new();
                    let mut unc_al = Vec::new();
                    let covered_set: std::collections::HashSet<usize> =
                        covered.iter().copied().collect();
                    for i in 0..src.len() {
                        let (c, a) = src.pixel(i);
                        if covered_set.contains(&i) {
                            for k in 0..3 {
                                cov_ch[k].push(c[k]);
                            }
                            cov_al.push(a);
                        } else {
                            for k in 0..3 {
                                unc_ch[k].push(c[k]);
                            }
                            unc_al.push(a);
                        }
                    }
                    fg = [
                        median_of(cov_ch[0].clone()),
                        median_of(cov_ch[1].clone()),
                        median_of(cov_ch[2].clone()),
                    ];
                    bg = [
                        median_of(unc_ch[0].clone()),
                        median_of(unc_ch[1].clone()),
                        median_of(unc_ch[2].clone()),
                    ];
                    fg_alpha = median_of(cov_al);
                    bg_alpha = median_of(unc_al);
                }
            }
        }

        let error = partition_error(cov_sum, cov_sq, n_cov, fg)
            + partition_error(unc_sum, unc_sq, n_unc, bg)
            + alpha_error(cov_a, cov_a_sq, n_cov, fg_alpha)
            + alpha_error(unc_a, unc_a_sq, n_unc, bg_alpha);

        Evaluated {
            error,
            fg,
            bg,
            fg_alpha,
            bg_alpha,
        }
    }

    fn hamming(&self, coverage: Coverage, quantized: u64) -> u32 {
        match coverage {
            Coverage::Narrow(b) => (b ^ quantized).count_ones(),
            Coverage::Wide([l, _]) => (l ^ quantized).count_ones(),
        }
    }

    /// Scans `candidates` (sorted by popcount) and returns the best match
    /// for this cell. `work_factor` < 1 restricts the scan to a popcount
    /// band around the tile's own ink density.
    pub fn best_match(
        &self,
        src: &CellSource,
        candidates: &[Candidate],
    ) -> Option<CellMatch> {
        let wf = self.config.work_factor();
        let cells = src.len() / CELL_PIXELS;
        let max_pop = (CELL_PIXELS * cells) as i32;
        let target = (src.quantized.count_ones() as i32) * cells as i32;
        let band = if wf >= 1.0 {
            max_pop
        } else {
            // Band halfwidth grows with the work factor; never below one
            // coverage row so flat tiles still see a few shapes.
            ((wf * max_pop as f32).ceil() as i32).max(CELL_W as i32)
        };

        let allow_swap =
            self.config.canvas_mode() == CanvasMode::FgBgBgFg && !self.config.fg_only_enabled();

        let mut covered = Vec::with_capacity(CELL_PIXELS * cells);
        let mut best: Option<(CellMatch, u32)> = None;

        for cand in candidates {
            if wf < 1.0 && (cand.popcount as i32 - target).abs() > band {
                continue;
            }
            covered_indices(cand.coverage, &mut covered);

            for swap in [false, true] {
                if swap && !allow_swap {
                    break;
                }
                let eval = self.evaluate(src, &covered, swap);
                let ham = self.hamming(cand.coverage, src.quantized);
                let m = CellMatch {
                    ch: cand.ch,
                    coverage: cand.coverage,
                    error: eval.error,
                    fg: eval.fg,
                    bg: eval.bg,
                    fg_alpha: eval.fg_alpha,
                    bg_alpha: eval.bg_alpha,
                    inverted: swap,
                };

                let better = match &best {
                    None => true,
                    Some((b, b_ham)) => {
                        if m.error < b.error {
                            true
                        } else if m.error == b.error {
                            ham < *b_ham || (ham == *b_ham && m.ch < b.ch)
                        } else {
                            false
                        }
                    }
                };
                if better {
                    best = Some((m, ham));
                }
            }
        }

        best.map(|(m, _)| m)
    }

    /// Matches against the primary map, falling back to the fill map when
    /// the best primary error is out of proportion to the tile's own
    /// variance.
    pub fn match_cell(
        &self,
        src: &CellSource,
        primary: &Compiled,
        fill: Option<&Compiled>,
    ) -> CellMatch {
        let space_fallback = CellMatch {
            ch: ' ',
            coverage: Coverage::Narrow(0),
            error: f32::MAX,
            fg: self.fixed_fg,
            bg: self.fixed_bg,
            fg_alpha: src.mean_alpha(),
            bg_alpha: src.mean_alpha(),
            inverted: false,
        };

        let best = self
            .best_match(src, &primary.narrow)
            .unwrap_or(space_fallback);

        if let Some(fill) = fill {
            let k = (1.5 - self.config.work_factor()).max(0.25);
            let threshold = k * src.variance * src.len() as f32;
            if best.error > threshold {
                if let Some(fill_best) = self.best_match(src, &fill.narrow) {
                    if fill_best.error < best.error {
                        return fill_best;
                    }
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::config::CanvasConfig;
    use crate::symbols::SymbolMap;

    fn uniform_source(rgb: [u8; 3], alpha: f32) -> CellSource {
        let c = rgb_to_working(rgb, ColorSpace::Rgb);
        CellSource::new(vec![c; 64], vec![alpha; 64])
    }

    fn compile(selector: &str) -> std::sync::Arc<Compiled> {
        let mut map = SymbolMap::new();
        map.apply_selectors(selector).unwrap();
        map.compile()
    }

    #[test]
    fn fgbg_black_tile_matches_space() {
        let mut config = CanvasConfig::new();
        config.set_canvas_mode(CanvasMode::FgBgBgFg);
        config.set_fg_only_enabled(true);
        config.set_work_factor(1.0).unwrap();
        let matcher = Matcher::new(&config);

        let src = uniform_source([0, 0, 0], 1.0);
        let compiled = compile("[ a]");
        let m = matcher.match_cell(&src, &compiled, None);
        assert_eq!(m.ch, ' ');
    }

    #[test]
    fn fgbg_white_tile_matches_inked_glyph() {
        let mut config = CanvasConfig::new();
        config.set_canvas_mode(CanvasMode::FgBgBgFg);
        config.set_fg_only_enabled(true);
        config.set_work_factor(1.0).unwrap();
        let matcher = Matcher::new(&config);

        let src = uniform_source([255, 255, 255], 1.0);
        let compiled = compile("[ a]");
        let m = matcher.match_cell(&src, &compiled, None);
        assert_eq!(m.ch, 'a');
    }

    #[test]
    fn half_and_half_tile_picks_half_block() {
        let config = CanvasConfig::new();
        let matcher = Matcher::new(&config);

        // Top half white, bottom half black.
        let white = rgb_to_working([255, 255, 255], ColorSpace::Rgb);
        let black = rgb_to_working([0, 0, 0], ColorSpace::Rgb);
        let mut colors = Vec::new();
        for y in 0..8 {
            for _ in 0..8 {
                colors.push(if y < 4 { white } else { black });
            }
        }
        let src = CellSource::new(colors, vec![1.0; 64]);

        let compiled = compile("space,vhalf,solid");
        let m = matcher.match_cell(&src, &compiled, None);
        assert!(m.ch == '▀' || m.ch == '▄', "got {:?}", m.ch);
        assert!(m.error < 1.0);
    }

    #[test]
    fn free_colors_recover_partition_means() {
        let config = CanvasConfig::new();
        let matcher = Matcher::new(&config);

        let red = rgb_to_working([200, 0, 0], ColorSpace::Rgb);
        let blue = rgb_to_working([0, 0, 200], ColorSpace::Rgb);
        let mut colors = Vec::new();
        for y in 0..8 {
            for _ in 0..8 {
                colors.push(if y < 4 { red } else { blue });
            }
        }
        let src = CellSource::new(colors, vec![1.0; 64]);

        let compiled = compile("space,vhalf,solid");
        let m = matcher.match_cell(&src, &compiled, None);
        // Whichever orientation wins, one partition is pure red and the
        // other pure blue.
        let got = [m.fg, m.bg];
        assert!(got.contains(&red) && got.contains(&blue));
    }

    #[test]
    fn work_factor_zero_still_finds_a_match() {
        let mut config = CanvasConfig::new();
        config.set_work_factor(0.0).unwrap();
        let matcher = Matcher::new(&config);

        let src = uniform_source([128, 128, 128], 1.0);
        let compiled = compile("all");
        let m = matcher.match_cell(&src, &compiled, None);
        // A flat tile reconstructs near-perfectly from the restricted
        // low-popcount band.
        assert!(m.error < 1e-2);
    }

    #[test]
    fn tie_break_prefers_lower_code_point() {
        let config = CanvasConfig::new();
        let matcher = Matcher::new(&config);

        // Left/right half sources tie on error between complementary
        // half blocks when colors are free; the matcher must be stable.
        let a = rgb_to_working([10, 10, 10], ColorSpace::Rgb);
        let b = rgb_to_working([240, 240, 240], ColorSpace::Rgb);
        let mut colors = Vec::new();
        for _ in 0..8 {
            for x in 0..8 {
                colors.push(if x < 4 { a } else { b });
            }
        }
        let src = CellSource::new(colors.clone(), vec![1.0; 64]);
        let compiled = compile("hhalf");
        let m1 = matcher.match_cell(&src, &compiled, None);
        let m2 = matcher.match_cell(&src, &compiled, None);
        assert_eq!(m1.ch, m2.ch);
        assert!(m1.error < 1.0);
    }
}
