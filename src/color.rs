//! Color types shared by the canvas and the terminal layer.
//!
//! Cell colors are either direct 24-bit RGB, a palette index with the usual
//! 256-color semantics (0..16 ANSI, 16..232 6×6×6 cube, 232..256 grayscale),
//! one of the terminal's default colors, or transparent. Perceptual work
//! happens in a "working space": linear RGB by default, DIN99d on request.

/// Raw per-cell color as exposed by the canvas accessors. Non-negative
/// values are palette indices (or packed RGB in truecolor mode).
pub const RAW_COLOR_TRANSPARENT: i32 = -1;
pub const RAW_COLOR_DEFAULT_FG: i32 = -2;
pub const RAW_COLOR_DEFAULT_BG: i32 = -3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Rgb(u8, u8, u8),
    Indexed(u8),
    DefaultFg,
    DefaultBg,
    Transparent,
}

impl Default for Color {
    fn default() -> Self {
        Color::Transparent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Rgb,
    Din99d,
}

pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

pub fn unpack_rgb(packed: u32) -> [u8; 3] {
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

/// Parse `#rrggbb` or `rrggbb` into packed RGB.
pub fn parse_packed_rgb(s: &str) -> Option<u32> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(pack_rgb(r, g, b))
}

/// Convert a single sRGB component (0..1) to linear light.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Perceived luminance of an 8-bit sRGB triple, in 0..=255.
pub fn luminance_u8(rgb: [u8; 3]) -> u8 {
    let l = 0.2126 * srgb_to_linear(rgb[0] as f32 / 255.0)
        + 0.7152 * srgb_to_linear(rgb[1] as f32 / 255.0)
        + 0.0722 * srgb_to_linear(rgb[2] as f32 / 255.0);
    (linear_to_srgb(l) * 255.0 + 0.5) as u8
}

// ── DIN99d ──────────────────────────────────────────────────────────────

const DEG50: f32 = 0.872_664_6; // 50° in radians

fn srgb8_to_xyz(rgb: [u8; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0] as f32 / 255.0);
    let g = srgb_to_linear(rgb[1] as f32 / 255.0);
    let b = srgb_to_linear(rgb[2] as f32 / 255.0);

    [
        0.4124 * r + 0.3576 * g + 0.1805 * b,
        0.2126 * r + 0.7152 * g + 0.0722 * b,
        0.0193 * r + 0.1192 * g + 0.9505 * b,
    ]
}

fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// DIN99d transform of an sRGB triple. The X axis is pre-warped
/// (x' = 1.12x − 0.12z) per the DIN99d definition, then the usual Lab →
/// rotated/compressed-chroma mapping is applied.
pub fn srgb8_to_din99d(rgb: [u8; 3]) -> [f32; 3] {
    let xyz = srgb8_to_xyz(rgb);
    let x = 1.12 * xyz[0] - 0.12 * xyz[2];
    let y = xyz[1];
    let z = xyz[2];

    // D65 reference white, x-warped the same way.
    const WX: f32 = 1.12 * 0.95047 - 0.12 * 1.08883;
    const WY: f32 = 1.0;
    const WZ: f32 = 1.08883;

    let fx = lab_f(x / WX);
    let fy = lab_f(y / WY);
    let fz = lab_f(z / WZ);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    let l99 = 325.22 * (1.0 + 0.0036 * l).ln();
    let e = a * DEG50.cos() + b * DEG50.sin();
    let f = 1.14 * (b * DEG50.cos() - a * DEG50.sin());
    let g = (e * e + f * f).sqrt();
    let h = f.atan2(e) + DEG50;
    let c99 = 22.5 * (1.0 + 0.06 * g).ln();

    [l99, c99 * h.cos(), c99 * h.sin()]
}

/// Map an 8-bit sRGB triple into the working color space. Components are
/// scaled so that typical distances are comparable between spaces.
pub fn rgb_to_working(rgb: [u8; 3], space: ColorSpace) -> [f32; 3] {
    match space {
        ColorSpace::Rgb => [
            srgb_to_linear(rgb[0] as f32 / 255.0) * 100.0,
            srgb_to_linear(rgb[1] as f32 / 255.0) * 100.0,
            srgb_to_linear(rgb[2] as f32 / 255.0) * 100.0,
        ],
        ColorSpace::Din99d => srgb8_to_din99d(rgb),
    }
}

pub fn working_to_rgb(c: [f32; 3], space: ColorSpace) -> [u8; 3] {
    match space {
        ColorSpace::Rgb => {
            let conv = |v: f32| (linear_to_srgb((v / 100.0).clamp(0.0, 1.0)) * 255.0 + 0.5) as u8;
            [conv(c[0]), conv(c[1]), conv(c[2])]
        }
        // The DIN99d inverse is never needed on the hot path; diffusion
        // residuals stay in working space. Round-trip via nearest palette
        // search instead of an analytic inverse.
        ColorSpace::Din99d => {
            let mut best = [0u8; 3];
            let mut best_d = f32::MAX;
            for step in 0..=15u32 {
                let v = (step * 17) as u8;
                for g in 0..=15u32 {
                    let gv = (g * 17) as u8;
                    for b in 0..=15u32 {
                        let bv = (b * 17) as u8;
                        let cand = srgb8_to_din99d([v, gv, bv]);
                        let d = dist2(cand, c);
                        if d < best_d {
                            best_d = d;
                            best = [v, gv, bv];
                        }
                    }
                }
            }
            best
        }
    }
}

pub fn dist2(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

// ── Palettes ────────────────────────────────────────────────────────────

/// xterm default values for the 16 ANSI colors.
pub const ANSI_16: [[u8; 3]; 16] = [
    [0x00, 0x00, 0x00],
    [0xcd, 0x00, 0x00],
    [0x00, 0xcd, 0x00],
    [0xcd, 0xcd, 0x00],
    [0x00, 0x00, 0xee],
    [0xcd, 0x00, 0xcd],
    [0x00, 0xcd, 0xcd],
    [0xe5, 0xe5, 0xe5],
    [0x7f, 0x7f, 0x7f],
    [0xff, 0x00, 0x00],
    [0x00, 0xff, 0x00],
    [0xff, 0xff, 0x00],
    [0x5c, 0x5c, 0xff],
    [0xff, 0x00, 0xff],
    [0x00, 0xff, 0xff],
    [0xff, 0xff, 0xff],
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// The full 256-entry terminal palette: 16 ANSI, 6×6×6 cube, 24 grays.
pub fn palette_256() -> [[u8; 3]; 256] {
    let mut pal = [[0u8; 3]; 256];
    pal[..16].copy_from_slice(&ANSI_16);

    for r in 0..6 {
        for g in 0..6 {
            for b in 0..6 {
                pal[16 + r * 36 + g * 6 + b] =
                    [CUBE_LEVELS[r], CUBE_LEVELS[g], CUBE_LEVELS[b]];
            }
        }
    }
    for i in 0..24 {
        let v = (8 + i * 10) as u8;
        pal[232 + i] = [v, v, v];
    }
    pal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let p = pack_rgb(0x12, 0x34, 0x56);
        assert_eq!(p, 0x123456);
        assert_eq!(unpack_rgb(p), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn parse_hex_forms() {
        assert_eq!(parse_packed_rgb("#ff8000"), Some(0xff8000));
        assert_eq!(parse_packed_rgb("010203"), Some(0x010203));
        assert_eq!(parse_packed_rgb("#fff"), None);
        assert_eq!(parse_packed_rgb("zzzzzz"), None);
    }

    #[test]
    fn palette_cube_and_grays() {
        let pal = palette_256();
        assert_eq!(pal[0], [0, 0, 0]);
        assert_eq!(pal[15], [255, 255, 255]);
        // 16 + 5*36 + 5*6 + 5 = 231 is cube white.
        assert_eq!(pal[231], [255, 255, 255]);
        assert_eq!(pal[16], [0, 0, 0]);
        assert_eq!(pal[232], [8, 8, 8]);
        assert_eq!(pal[255], [238, 238, 238]);
    }

    #[test]
    fn din99d_orders_lightness() {
        let black = srgb8_to_din99d([0, 0, 0]);
        let gray = srgb8_to_din99d([128, 128, 128]);
        let white = srgb8_to_din99d([255, 255, 255]);
        assert!(black[0] < gray[0]);
        assert!(gray[0] < white[0]);
        // Neutral axis stays close to zero chroma.
        assert!(gray[1].abs() < 1.0 && gray[2].abs() < 1.0);
    }

    #[test]
    fn working_distance_separates_hues() {
        for space in [ColorSpace::Rgb, ColorSpace::Din99d] {
            let red = rgb_to_working([255, 0, 0], space);
            let red2 = rgb_to_working([250, 5, 5], space);
            let blue = rgb_to_working([0, 0, 255], space);
            assert!(dist2(red, red2) < dist2(red, blue));
        }
    }
}
