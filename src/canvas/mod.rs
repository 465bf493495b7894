//! The canvas: per-cell analysis of source pixels into (glyph, fg, bg).

pub mod config;
pub mod dither;
pub mod matcher;
pub mod print;
pub mod resample;

use rayon::prelude::*;

use crate::canvas::config::{CanvasConfig, CanvasMode, DitherMode, PixelType};
use crate::canvas::dither::Dither;
use crate::canvas::matcher::{CellMatch, CellSource, Matcher, CELL_H, CELL_W};
use crate::canvas::resample::{resample, WorkPixel};
use crate::color::{
    pack_rgb, palette_256, rgb_to_working, working_to_rgb, ColorSpace, RAW_COLOR_DEFAULT_BG,
    RAW_COLOR_DEFAULT_FG, RAW_COLOR_TRANSPARENT,
};
use crate::error::{Error, Result};
use crate::symbols::{width_tag, tag, Compiled, Coverage};

/// Sentinel stored in the cell to the right of a wide glyph.
pub const WIDE_RIGHT: char = '\0';

/// Floyd-Steinberg weights, in scan order (right, below-left, below,
/// below-right). Distribution is deliberately non-serpentine.
const FS_WEIGHTS: [(isize, isize, f32); 4] = [
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg_raw: i32,
    pub bg_raw: i32,
    pub fg_rgb: [u8; 3],
    pub bg_rgb: [u8; 3],
    pub inverted: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg_raw: RAW_COLOR_DEFAULT_FG,
            bg_raw: RAW_COLOR_DEFAULT_BG,
            fg_rgb: [255, 255, 255],
            bg_rgb: [0, 0, 0],
            inverted: false,
        }
    }
}

pub struct Canvas {
    config: CanvasConfig,
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Canvas {
    /// Builds a canvas from a snapshot of `config`.
    pub fn new(config: &CanvasConfig) -> Self {
        let (width, height) = config.geometry();
        let blank = Cell {
            fg_rgb: config.fg_rgb(),
            bg_rgb: config.bg_rgb(),
            ..Cell::default()
        };
        Self {
            config: config.clone(),
            width,
            height,
            cells: vec![blank; width * height],
        }
    }

    /// A new canvas sharing this one's configuration.
    pub fn new_similar(&self) -> Self {
        Self::new(&self.config)
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[cfg(test)]
    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub(crate) fn cell_at(&self, x: usize, y: usize) -> Option<&Cell> {
        if x < self.width && y < self.height {
            Some(&self.cells[y * self.width + x])
        } else {
            None
        }
    }

    // ── Drawing ─────────────────────────────────────────────────────────

    /// Renders a source pixel buffer onto every cell of the canvas.
    pub fn draw_all_pixels(
        &mut self,
        pixel_type: PixelType,
        pixels: &[u8],
        src_width: usize,
        src_height: usize,
        rowstride: usize,
    ) -> Result<()> {
        let bpp = pixel_type.bytes_per_pixel();
        if src_width == 0 || src_height == 0 {
            return Err(Error::BadPixelBuffer("empty source".into()));
        }
        if rowstride < src_width * bpp
            || pixels.len() < rowstride * (src_height - 1) + src_width * bpp
        {
            return Err(Error::BadPixelBuffer(format!(
                "buffer too small for {}x{} at rowstride {}",
                src_width, src_height, rowstride
            )));
        }

        let row_px = self.width * CELL_W;
        let col_px = self.height * CELL_H;
        let mut work = resample(
            pixels, pixel_type, src_width, src_height, rowstride, row_px, col_px,
        );

        if self.config.preprocessing_enabled() && self.config.canvas_mode().is_low_color() {
            preprocess(&mut work);
        }

        let primary = self.config.symbol_map().compile();
        let fill = self.config.fill_symbol_map().map(|m| m.compile());
        let matcher = Matcher::new(&self.config);
        let quantizer = Quantizer::new(&self.config);

        if self.config.dither_mode() == DitherMode::Diffusion {
            diffuse_draw(
                &mut self.cells,
                self.width,
                self.height,
                &self.config,
                &work,
                row_px,
                &matcher,
                &quantizer,
                &primary,
                fill.as_deref(),
            );
            return Ok(());
        }

        let config = &self.config;
        let work_ref = &work;
        let primary_ref = &primary;
        let fill_ref = fill.as_deref();

        if crate::n_threads() == 1 {
            for (cy, row) in self.cells.chunks_mut(self.width).enumerate() {
                draw_row(
                    config, work_ref, row_px, cy, &matcher, &quantizer, primary_ref,
                    fill_ref, row,
                );
            }
        } else {
            let matcher_ref = &matcher;
            let quantizer_ref = &quantizer;
            self.cells
                .par_chunks_mut(self.width)
                .enumerate()
                .for_each(|(cy, row)| {
                    draw_row(
                        config, work_ref, row_px, cy, matcher_ref, quantizer_ref,
                        primary_ref, fill_ref, row,
                    );
                });
        }

        Ok(())
    }

    // ── Direct cell access ──────────────────────────────────────────────

    pub fn get_char_at(&self, x: usize, y: usize) -> Option<char> {
        self.cell_at(x, y).map(|c| c.ch)
    }

    /// Writes a glyph at (x, y). Wide characters occupy two cells; the
    /// number of cells written is returned (0 if out of bounds or a wide
    /// glyph would overflow the row).
    pub fn set_char_at(&mut self, x: usize, y: usize, ch: char) -> usize {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let wide = width_tag(ch) == tag::WIDE;
        if wide {
            if x + 1 >= self.width {
                return 0;
            }
            self.cells[y * self.width + x].ch = ch;
            let left = self.cells[y * self.width + x];
            let right = &mut self.cells[y * self.width + x + 1];
            right.ch = WIDE_RIGHT;
            right.fg_raw = left.fg_raw;
            right.bg_raw = left.bg_raw;
            right.fg_rgb = left.fg_rgb;
            right.bg_rgb = left.bg_rgb;
            right.inverted = left.inverted;
            2
        } else {
            self.cells[y * self.width + x].ch = ch;
            1
        }
    }

    /// Display colors as packed RGB (or `RAW_COLOR_TRANSPARENT`).
    pub fn get_colors_at(&self, x: usize, y: usize) -> Option<(i32, i32)> {
        self.cell_at(x, y).map(|c| {
            let fg = if c.fg_raw == RAW_COLOR_TRANSPARENT {
                RAW_COLOR_TRANSPARENT
            } else {
                pack_rgb(c.fg_rgb[0], c.fg_rgb[1], c.fg_rgb[2]) as i32
            };
            let bg = if c.bg_raw == RAW_COLOR_TRANSPARENT {
                RAW_COLOR_TRANSPARENT
            } else {
                pack_rgb(c.bg_rgb[0], c.bg_rgb[1], c.bg_rgb[2]) as i32
            };
            (fg, bg)
        })
    }

    pub fn set_colors_at(&mut self, x: usize, y: usize, fg: i32, bg: i32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let cell = &mut self.cells[y * self.width + x];
        if fg >= 0 {
            cell.fg_rgb = crate::color::unpack_rgb(fg as u32);
            cell.fg_raw = fg;
        } else {
            cell.fg_raw = fg;
        }
        if bg >= 0 {
            cell.bg_rgb = crate::color::unpack_rgb(bg as u32);
            cell.bg_raw = bg;
        } else {
            cell.bg_raw = bg;
        }
    }

    /// Raw colors: palette indices in the indexed modes, packed RGB in
    /// truecolor, or the DEFAULT_FG/DEFAULT_BG/TRANSPARENT specials.
    pub fn get_raw_colors_at(&self, x: usize, y: usize) -> Option<(i32, i32)> {
        self.cell_at(x, y).map(|c| (c.fg_raw, c.bg_raw))
    }

    pub fn set_raw_colors_at(&mut self, x: usize, y: usize, fg: i32, bg: i32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let pal = palette_256();
        let cell = &mut self.cells[y * self.width + x];
        cell.fg_raw = fg;
        cell.bg_raw = bg;
        match self.config.canvas_mode() {
            CanvasMode::Truecolor => {
                if fg >= 0 {
                    cell.fg_rgb = crate::color::unpack_rgb(fg as u32);
                }
                if bg >= 0 {
                    cell.bg_rgb = crate::color::unpack_rgb(bg as u32);
                }
            }
            _ => {
                if (0..256).contains(&fg) {
                    cell.fg_rgb = pal[fg as usize];
                }
                if (0..256).contains(&bg) {
                    cell.bg_rgb = pal[bg as usize];
                }
            }
        }
    }
}

/// Serial scan-order matching with Floyd-Steinberg error diffusion at
/// cell-pixel resolution. Residuals are computed against the rounded
/// output colors and distributed to pixels of cells not yet visited.
#[allow(clippy::too_many_arguments)]
fn diffuse_draw(
    cells: &mut [Cell],
    width: usize,
    height: usize,
    config: &CanvasConfig,
    work: &[WorkPixel],
    row_px: usize,
    matcher: &Matcher,
    quantizer: &Quantizer,
    primary: &Compiled,
    fill: Option<&Compiled>,
) {
    let space = config.color_space();
    let col_px = height * CELL_H;
    let mut err = vec![[0.0f32; 3]; row_px * col_px];

    for cy in 0..height {
        for cx in 0..width {
            let src = CellSource::from_work(
                work, row_px, cx * CELL_W, cy * CELL_H, 1, space, Some(&err),
            );
            let m = matcher.match_cell(&src, primary, fill);
            let cell = quantizer.quantize(&m, cx, cy);

            let fg_w = rgb_to_working(cell.fg_rgb, space);
            let bg_w = rgb_to_working(cell.bg_rgb, space);
            let bits = match m.coverage {
                Coverage::Narrow(b) => b,
                Coverage::Wide([l, _]) => l,
            };
            for py in 0..CELL_H {
                for px in 0..CELL_W {
                    let (c, _a) = src.pixel(py * CELL_W + px);
                    let recon = if bits >> (py * CELL_W + px) & 1 != 0 {
                        fg_w
                    } else {
                        bg_w
                    };
                    let gx = cx * CELL_W + px;
                    let gy = cy * CELL_H + py;
                    for (dx, dy, w) in FS_WEIGHTS {
                        let tx = gx as isize + dx;
                        let ty = gy as isize + dy;
                        if tx < 0 || ty < 0 || tx >= row_px as isize || ty >= col_px as isize {
                            continue;
                        }
                        let t = ty as usize * row_px + tx as usize;
                        for k in 0..3 {
                            err[t][k] += (c[k] - recon[k]) * w;
                        }
                    }
                }
            }

            cells[cy * width + cx] = cell;
        }
    }
}

/// Matches and quantizes one cell row. Shared by the serial and parallel
/// paths; cells are independent when diffusion is off.
#[allow(clippy::too_many_arguments)]
fn draw_row(
    config: &CanvasConfig,
    work: &[WorkPixel],
    row_px: usize,
    cy: usize,
    matcher: &Matcher,
    quantizer: &Quantizer,
    primary: &Compiled,
    fill: Option<&Compiled>,
    row: &mut [Cell],
) {
    let space = config.color_space();
    let width = row.len();

    let mut matches: Vec<CellMatch> = Vec::with_capacity(width);
    for cx in 0..width {
        let src =
            CellSource::from_work(work, row_px, cx * CELL_W, cy * CELL_H, 1, space, None);
        matches.push(matcher.match_cell(&src, primary, fill));
    }

    // Wide-glyph pass: a two-cell window replaces two narrow matches when
    // it reconstructs the pair strictly better.
    if !primary.wide.is_empty() {
        let mut cx = 0;
        while cx + 1 < width {
            let src = CellSource::from_work(
                work, row_px, cx * CELL_W, cy * CELL_H, 2, space, None,
            );
            if let Some(wide) = matcher.best_match(&src, &primary.wide) {
                if wide.error < matches[cx].error + matches[cx + 1].error {
                    matches[cx] = wide;
                    matches[cx + 1] = CellMatch {
                        ch: WIDE_RIGHT,
                        ..wide
                    };
                    cx += 2;
                    continue;
                }
            }
            cx += 1;
        }
    }

    for (cx, m) in matches.iter().enumerate() {
        row[cx] = quantizer.quantize(m, cx, cy);
    }
}

/// Saturation boost and gamut clamp for the low-color modes, in place on
/// the premultiplied work buffer.
fn preprocess(work: &mut [WorkPixel]) {
    const BOOST: f32 = 1.4;
    for px in work {
        let gray = (px[0] + px[1] + px[2]) / 3.0;
        for c in 0..3 {
            px[c] = (gray + (px[c] - gray) * BOOST).clamp(0.0, px[3]);
        }
    }
}

/// Converts matched working-space colors into final cell colors for the
/// configured canvas mode.
struct Quantizer {
    mode: CanvasMode,
    space: ColorSpace,
    threshold: f32,
    fg_only: bool,
    fg_rgb: [u8; 3],
    bg_rgb: [u8; 3],
    dither: Dither,
    /// Working-space images of the 256-color palette.
    palette: Vec<[f32; 3]>,
    palette_rgb: [[u8; 3]; 256],
}

impl Quantizer {
    fn new(config: &CanvasConfig) -> Self {
        let space = config.color_space();
        let palette_rgb = palette_256();
        let palette = palette_rgb
            .iter()
            .map(|&rgb| rgb_to_working(rgb, space))
            .collect();
        Self {
            mode: config.canvas_mode(),
            space,
            threshold: config.transparency_threshold(),
            fg_only: config.fg_only_enabled(),
            fg_rgb: config.fg_rgb(),
            bg_rgb: config.bg_rgb(),
            dither: Dither::new(
                config.dither_mode(),
                config.dither_grain(),
                config.dither_intensity(),
            ),
            palette,
            palette_rgb,
        }
    }

    fn nearest_index(&self, c: [f32; 3], lo: usize, hi: usize) -> usize {
        let mut best = lo;
        let mut best_d = f32::MAX;
        for i in lo..hi {
            let d = crate::color::dist2(self.palette[i], c);
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    fn quantize(&self, m: &CellMatch, cx: usize, cy: usize) -> Cell {
        let offset = self.dither.offset(cx * CELL_W, cy * CELL_H);
        let jitter = |c: [f32; 3]| [c[0] + offset[0], c[1] + offset[1], c[2] + offset[2]];

        let fg_transparent = m.fg_alpha < self.threshold;
        let bg_transparent = m.bg_alpha < self.threshold;

        let mut cell = Cell {
            ch: if fg_transparent && bg_transparent {
                ' '
            } else {
                m.ch
            },
            inverted: m.inverted,
            ..Cell::default()
        };
        cell.fg_rgb = self.fg_rgb;
        cell.bg_rgb = self.bg_rgb;

        match self.mode {
            CanvasMode::Truecolor => {
                let fg = working_to_rgb(m.fg, self.space);
                let bg = working_to_rgb(m.bg, self.space);
                cell.fg_rgb = fg;
                cell.bg_rgb = bg;
                cell.fg_raw = pack_rgb(fg[0], fg[1], fg[2]) as i32;
                cell.bg_raw = pack_rgb(bg[0], bg[1], bg[2]) as i32;
            }
            CanvasMode::Indexed256
            | CanvasMode::Indexed240
            | CanvasMode::Indexed16
            | CanvasMode::Indexed16_8
            | CanvasMode::Indexed8 => {
                let (fg_lo, fg_hi, bg_lo, bg_hi) = match self.mode {
                    CanvasMode::Indexed256 => (0, 256, 0, 256),
                    CanvasMode::Indexed240 => (16, 256, 16, 256),
                    CanvasMode::Indexed16 => (0, 16, 0, 16),
                    CanvasMode::Indexed16_8 => (0, 16, 0, 8),
                    CanvasMode::Indexed8 => (0, 8, 0, 8),
                    _ => unreachable!(),
                };
                let fi = self.nearest_index(jitter(m.fg), fg_lo, fg_hi);
                let bi = self.nearest_index(jitter(m.bg), bg_lo, bg_hi);
                cell.fg_raw = fi as i32;
                cell.bg_raw = bi as i32;
                cell.fg_rgb = self.palette_rgb[fi];
                cell.bg_rgb = self.palette_rgb[bi];
            }
            CanvasMode::FgBg | CanvasMode::FgBgBgFg => {
                cell.fg_raw = RAW_COLOR_DEFAULT_FG;
                cell.bg_raw = RAW_COLOR_DEFAULT_BG;
            }
        }

        if fg_transparent {
            cell.fg_raw = RAW_COLOR_TRANSPARENT;
        }
        if bg_transparent || self.fg_only {
            cell.bg_raw = RAW_COLOR_TRANSPARENT;
            cell.bg_rgb = self.bg_rgb;
        }

        cell
    }
}
