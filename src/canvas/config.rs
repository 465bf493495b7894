//! Canvas configuration: geometry, color model, symbol maps, dithering.

use crate::color::{pack_rgb, unpack_rgb};
use crate::error::{Error, Result};
use crate::symbols::SymbolMap;

/// Memory layout of an 8-bit-per-channel source pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Rgba8Premultiplied,
    Bgra8Premultiplied,
    Argb8Premultiplied,
    Abgr8Premultiplied,
    Rgba8Unassociated,
    Bgra8Unassociated,
    Argb8Unassociated,
    Abgr8Unassociated,
    Rgb8,
    Bgr8,
}

impl PixelType {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Rgb8 | PixelType::Bgr8 => 3,
            _ => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        self.bytes_per_pixel() == 4
    }

    pub fn is_premultiplied(self) -> bool {
        matches!(
            self,
            PixelType::Rgba8Premultiplied
                | PixelType::Bgra8Premultiplied
                | PixelType::Argb8Premultiplied
                | PixelType::Abgr8Premultiplied
        )
    }

    /// Byte offsets of (r, g, b, a) within a pixel; alpha is `None` for
    /// the 24-bit layouts.
    fn offsets(self) -> ([usize; 3], Option<usize>) {
        match self {
            PixelType::Rgba8Premultiplied | PixelType::Rgba8Unassociated => {
                ([0, 1, 2], Some(3))
            }
            PixelType::Bgra8Premultiplied | PixelType::Bgra8Unassociated => {
                ([2, 1, 0], Some(3))
            }
            PixelType::Argb8Premultiplied | PixelType::Argb8Unassociated => {
                ([1, 2, 3], Some(0))
            }
            PixelType::Abgr8Premultiplied | PixelType::Abgr8Unassociated => {
                ([3, 2, 1], Some(0))
            }
            PixelType::Rgb8 => ([0, 1, 2], None),
            PixelType::Bgr8 => ([2, 1, 0], None),
        }
    }

    /// Reads one pixel as premultiplied RGBA. Unassociated input is
    /// multiplied through with round-to-nearest.
    pub fn read_rgba_premultiplied(self, src: &[u8]) -> [u8; 4] {
        let ([ro, go, bo], ao) = self.offsets();
        let a = ao.map_or(255, |o| src[o]);
        let (r, g, b) = (src[ro], src[go], src[bo]);

        if self.is_premultiplied() || ao.is_none() {
            [r, g, b, a]
        } else {
            let mul = |c: u8| ((c as f32 * a as f32) / 255.0).round() as u8;
            [mul(r), mul(g), mul(b), a]
        }
    }

    /// Reads one pixel as unassociated RGBA (premultiplied input is
    /// divided back out).
    pub fn read_rgba_unassociated(self, src: &[u8]) -> [u8; 4] {
        let ([ro, go, bo], ao) = self.offsets();
        let a = ao.map_or(255, |o| src[o]);
        let (r, g, b) = (src[ro], src[go], src[bo]);

        if self.is_premultiplied() && a > 0 && a < 255 {
            let div = |c: u8| ((c as f32 * 255.0) / a as f32).round().min(255.0) as u8;
            [div(r), div(g), div(b), a]
        } else {
            [r, g, b, a]
        }
    }

    /// Writes an unassociated RGBA pixel in this layout.
    pub fn write_rgba_unassociated(self, dest: &mut [u8], px: [u8; 4]) {
        let ([ro, go, bo], ao) = self.offsets();
        let [r, g, b, a] = px;

        let (r, g, b) = if self.is_premultiplied() {
            let mul = |c: u8| ((c as f32 * a as f32) / 255.0).round() as u8;
            (mul(r), mul(g), mul(b))
        } else {
            (r, g, b)
        };

        dest[ro] = r;
        dest[go] = g;
        dest[bo] = b;
        if let Some(o) = ao {
            dest[o] = a;
        }
    }
}

/// Output color model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasMode {
    #[default]
    Truecolor,
    Indexed256,
    Indexed240,
    Indexed16,
    /// 16 foreground colors, 8 background colors.
    Indexed16_8,
    Indexed8,
    /// Default FG/BG only, inversion allowed.
    FgBgBgFg,
    /// Default FG/BG only.
    FgBg,
}

impl CanvasMode {
    pub fn is_low_color(self) -> bool {
        matches!(
            self,
            CanvasMode::Indexed16_8
                | CanvasMode::Indexed8
                | CanvasMode::FgBgBgFg
                | CanvasMode::FgBg
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorExtractor {
    #[default]
    Average,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherMode {
    #[default]
    None,
    Ordered,
    Diffusion,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelMode {
    #[default]
    Symbols,
    Sixels,
    Kitty,
    Iterm2,
}

/// Output-size optimizations. These never change what the canvas looks
/// like, only how many bytes it takes to say it.
pub type Optimizations = u32;

pub mod opt {
    use super::Optimizations;

    pub const NONE: Optimizations = 0;
    pub const REUSE_ATTRIBUTES: Optimizations = 1 << 0;
    /// Reserved.
    pub const SKIP_CELLS: Optimizations = 1 << 1;
    pub const REPEAT_CELLS: Optimizations = 1 << 2;
    pub const ALL: Optimizations = 0x7fff_ffff;
}

/// Immutable-after-build canvas settings. Mutators validate and reject bad
/// values instead of clamping.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    width: usize,
    height: usize,
    cell_size_px: Option<(usize, usize)>,
    canvas_mode: CanvasMode,
    color_extractor: ColorExtractor,
    color_space: crate::color::ColorSpace,
    symbol_map: SymbolMap,
    fill_symbol_map: Option<SymbolMap>,
    transparency_threshold: f32,
    fg_color: u32,
    bg_color: u32,
    work_factor: f32,
    preprocessing: bool,
    dither_mode: DitherMode,
    dither_grain: (usize, usize),
    dither_intensity: f32,
    pixel_mode: PixelMode,
    optimizations: Optimizations,
    fg_only: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
            cell_size_px: None,
            canvas_mode: CanvasMode::Truecolor,
            color_extractor: ColorExtractor::Average,
            color_space: crate::color::ColorSpace::Rgb,
            symbol_map: SymbolMap::default(),
            fill_symbol_map: None,
            transparency_threshold: 0.5,
            fg_color: pack_rgb(0xff, 0xff, 0xff),
            bg_color: pack_rgb(0x00, 0x00, 0x00),
            work_factor: 0.5,
            preprocessing: true,
            dither_mode: DitherMode::None,
            dither_grain: (4, 4),
            dither_intensity: 1.0,
            pixel_mode: PixelMode::Symbols,
            optimizations: opt::NONE,
            fg_only: false,
        }
    }
}

impl CanvasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn set_geometry(&mut self, width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(Error::BadGeometry(width, height));
        }
        self.width = width as usize;
        self.height = height as usize;
        Ok(())
    }

    /// Cell size in pixels, if known; used for aspect correction and the
    /// pixel-mode back-ends. Symbol mode falls back to 8×8.
    pub fn cell_size_px(&self) -> Option<(usize, usize)> {
        self.cell_size_px
    }

    pub fn set_cell_size_px(&mut self, width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(Error::BadGeometry(width, height));
        }
        self.cell_size_px = Some((width as usize, height as usize));
        Ok(())
    }

    pub fn canvas_mode(&self) -> CanvasMode {
        self.canvas_mode
    }

    pub fn set_canvas_mode(&mut self, mode: CanvasMode) {
        self.canvas_mode = mode;
    }

    pub fn color_extractor(&self) -> ColorExtractor {
        self.color_extractor
    }

    pub fn set_color_extractor(&mut self, extractor: ColorExtractor) {
        self.color_extractor = extractor;
    }

    pub fn color_space(&self) -> crate::color::ColorSpace {
        self.color_space
    }

    pub fn set_color_space(&mut self, space: crate::color::ColorSpace) {
        self.color_space = space;
    }

    pub fn symbol_map(&self) -> &SymbolMap {
        &self.symbol_map
    }

    pub fn set_symbol_map(&mut self, map: SymbolMap) {
        self.symbol_map = map;
    }

    pub fn fill_symbol_map(&self) -> Option<&SymbolMap> {
        self.fill_symbol_map.as_ref()
    }

    pub fn set_fill_symbol_map(&mut self, map: Option<SymbolMap>) {
        self.fill_symbol_map = map;
    }

    pub fn transparency_threshold(&self) -> f32 {
        self.transparency_threshold
    }

    pub fn set_transparency_threshold(&mut self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "transparency threshold {} outside [0, 1]",
                threshold
            )));
        }
        self.transparency_threshold = threshold;
        Ok(())
    }

    /// Packed RGB used to resolve the default foreground.
    pub fn fg_color(&self) -> u32 {
        self.fg_color
    }

    pub fn set_fg_color(&mut self, packed_rgb: u32) {
        self.fg_color = packed_rgb & 0xff_ff_ff;
    }

    pub fn bg_color(&self) -> u32 {
        self.bg_color
    }

    pub fn set_bg_color(&mut self, packed_rgb: u32) {
        self.bg_color = packed_rgb & 0xff_ff_ff;
    }

    pub fn fg_rgb(&self) -> [u8; 3] {
        unpack_rgb(self.fg_color)
    }

    pub fn bg_rgb(&self) -> [u8; 3] {
        unpack_rgb(self.bg_color)
    }

    pub fn work_factor(&self) -> f32 {
        self.work_factor
    }

    pub fn set_work_factor(&mut self, factor: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(Error::Config(format!(
                "work factor {} outside [0, 1]",
                factor
            )));
        }
        self.work_factor = factor;
        Ok(())
    }

    pub fn preprocessing_enabled(&self) -> bool {
        self.preprocessing
    }

    pub fn set_preprocessing_enabled(&mut self, enabled: bool) {
        self.preprocessing = enabled;
    }

    pub fn dither_mode(&self) -> DitherMode {
        self.dither_mode
    }

    pub fn set_dither_mode(&mut self, mode: DitherMode) {
        self.dither_mode = mode;
    }

    pub fn dither_grain(&self) -> (usize, usize) {
        self.dither_grain
    }

    pub fn set_dither_grain(&mut self, width: i32, height: i32) -> Result<()> {
        for dim in [width, height] {
            if !matches!(dim, 1 | 2 | 4 | 8) {
                return Err(Error::Config(format!(
                    "dither grain {}x{} not a power of two in 1..=8",
                    width, height
                )));
            }
        }
        self.dither_grain = (width as usize, height as usize);
        Ok(())
    }

    pub fn dither_intensity(&self) -> f32 {
        self.dither_intensity
    }

    pub fn set_dither_intensity(&mut self, intensity: f32) -> Result<()> {
        if intensity < 0.0 || !intensity.is_finite() {
            return Err(Error::Config(format!(
                "dither intensity {} out of range",
                intensity
            )));
        }
        self.dither_intensity = intensity;
        Ok(())
    }

    pub fn pixel_mode(&self) -> PixelMode {
        self.pixel_mode
    }

    pub fn set_pixel_mode(&mut self, mode: PixelMode) {
        self.pixel_mode = mode;
    }

    pub fn optimizations(&self) -> Optimizations {
        self.optimizations
    }

    pub fn set_optimizations(&mut self, optimizations: Optimizations) {
        self.optimizations = optimizations;
    }

    pub fn fg_only_enabled(&self) -> bool {
        self.fg_only
    }

    pub fn set_fg_only_enabled(&mut self, fg_only: bool) {
        self.fg_only = fg_only;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rejects_nonpositive() {
        let mut cfg = CanvasConfig::new();
        assert!(cfg.set_geometry(0, 10).is_err());
        assert!(cfg.set_geometry(10, -1).is_err());
        cfg.set_geometry(120, 40).unwrap();
        assert_eq!(cfg.geometry(), (120, 40));
    }

    #[test]
    fn threshold_and_work_factor_bounds() {
        let mut cfg = CanvasConfig::new();
        assert!(cfg.set_transparency_threshold(1.5).is_err());
        assert!(cfg.set_transparency_threshold(-0.1).is_err());
        cfg.set_transparency_threshold(0.0).unwrap();
        cfg.set_transparency_threshold(1.0).unwrap();

        assert!(cfg.set_work_factor(2.0).is_err());
        cfg.set_work_factor(1.0).unwrap();
    }

    #[test]
    fn dither_grain_must_be_pow2() {
        let mut cfg = CanvasConfig::new();
        assert!(cfg.set_dither_grain(3, 4).is_err());
        assert!(cfg.set_dither_grain(16, 16).is_err());
        cfg.set_dither_grain(8, 2).unwrap();
        assert_eq!(cfg.dither_grain(), (8, 2));
    }

    #[test]
    fn pixel_type_premultiply_rounds_to_nearest() {
        let src = [200u8, 100, 50, 128];
        let px = PixelType::Rgba8Unassociated.read_rgba_premultiplied(&src);
        // 200*128/255 = 100.39 → 100; 100*128/255 = 50.19 → 50;
        // 50*128/255 = 25.09 → 25.
        assert_eq!(px, [100, 50, 25, 128]);
    }

    #[test]
    fn pixel_type_channel_orders() {
        let src = [1u8, 2, 3, 4];
        assert_eq!(
            PixelType::Bgra8Premultiplied.read_rgba_premultiplied(&src),
            [3, 2, 1, 4]
        );
        assert_eq!(
            PixelType::Argb8Premultiplied.read_rgba_premultiplied(&src),
            [2, 3, 4, 1]
        );
        assert_eq!(
            PixelType::Rgb8.read_rgba_premultiplied(&src[..3]),
            [1, 2, 3, 255]
        );
        assert_eq!(
            PixelType::Bgr8.read_rgba_premultiplied(&src[..3]),
            [3, 2, 1, 255]
        );
    }
}
