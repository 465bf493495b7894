//! Small shared helpers: image rotation, label ellipsizing, canvas
//! geometry fitting.

use unicode_width::UnicodeWidthStr;

/// Placement of an element within an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Start,
    End,
    Center,
}

/// Resizing policy when placing an element within an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tuck {
    /// Fill the area exactly, ignoring aspect ratio.
    Stretch,
    /// Fit inside the area, preserving aspect ratio.
    #[default]
    Fit,
    /// Like `Fit`, but never enlarge.
    ShrinkToFit,
}

/// EXIF-style orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R0Mirror,
    R180,
    R180Mirror,
    R270Mirror,
    R90,
    R90Mirror,
    R270,
}

impl Rotation {
    /// Maps the EXIF orientation tag (1..=8); anything else is identity.
    pub fn from_exif(orientation: u32) -> Self {
        match orientation {
            2 => Rotation::R0Mirror,
            3 => Rotation::R180,
            4 => Rotation::R180Mirror,
            5 => Rotation::R270Mirror,
            6 => Rotation::R90,
            7 => Rotation::R90Mirror,
            8 => Rotation::R270,
            _ => Rotation::R0,
        }
    }

    pub fn invert(self) -> Self {
        match self {
            Rotation::R90 => Rotation::R270,
            Rotation::R270 => Rotation::R90,
            other => other,
        }
    }

    fn swaps_axes(self) -> bool {
        matches!(
            self,
            Rotation::R90 | Rotation::R90Mirror | Rotation::R270 | Rotation::R270Mirror
        )
    }
}

/// Rotates/mirrors a tightly-or-loosely packed pixel buffer with
/// `n_channels` bytes per pixel. Returns the new buffer, dimensions, and
/// rowstride.
pub fn rotate_image(
    src: &[u8],
    width: usize,
    height: usize,
    rowstride: usize,
    n_channels: usize,
    rotation: Rotation,
) -> (Vec<u8>, usize, usize, usize) {
    assert!(n_channels == 3 || n_channels == 4);

    if rotation == Rotation::R0 {
        let mut out = Vec::with_capacity(width * height * n_channels);
        for y in 0..height {
            out.extend_from_slice(&src[y * rowstride..y * rowstride + width * n_channels]);
        }
        return (out, width, height, width * n_channels);
    }

    let (dst_w, dst_h) = if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    };
    let dst_stride = dst_w * n_channels;
    let mut out = vec![0u8; dst_stride * dst_h];

    for y in 0..height {
        for x in 0..width {
            // Destination coordinates of source pixel (x, y).
            let (dx, dy) = match rotation {
                Rotation::R0 => (x, y),
                Rotation::R0Mirror => (width - 1 - x, y),
                Rotation::R180 => (width - 1 - x, height - 1 - y),
                Rotation::R180Mirror => (x, height - 1 - y),
                Rotation::R90 => (height - 1 - y, x),
                Rotation::R90Mirror => (y, x),
                Rotation::R270 => (y, width - 1 - x),
                Rotation::R270Mirror => (height - 1 - y, width - 1 - x),
            };
            let s = y * rowstride + x * n_channels;
            let d = dy * dst_stride + dx * n_channels;
            out[d..d + n_channels].copy_from_slice(&src[s..s + n_channels]);
        }
    }

    (out, dst_w, dst_h, dst_stride)
}

/// Truncates `s` to at most `len_max` characters, appending `…` (or `>`
/// in ASCII-only mode) when something was cut.
pub fn ellipsize_string(s: &str, len_max: usize, use_unicode: bool) -> String {
    if len_max == 0 {
        return String::new();
    }
    let n_chars = s.chars().count();
    if n_chars <= len_max {
        return s.to_string();
    }

    let mut out: String = s.chars().take(len_max).collect();
    out.push(if use_unicode { '\u{2026}' } else { '>' });
    out
}

pub fn path_ellipsized_basename(path: &str, len_max: usize, use_unicode: bool) -> String {
    let basename = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "?".to_string());
    ellipsize_string(&basename, len_max, use_unicode)
}

/// One padded label line of exactly `field_width` columns.
pub fn label_line(path: &str, halign: Align, field_width: usize, use_unicode: bool) -> String {
    let label = path_ellipsized_basename(path, field_width.saturating_sub(1), use_unicode);
    let label_width = label.width();
    let pad = field_width.saturating_sub(label_width);

    match halign {
        Align::Start => format!("{}{}", label, " ".repeat(pad)),
        Align::End => format!("{}{}", " ".repeat(pad), label),
        Align::Center => {
            let left = pad / 2;
            format!("{}{}{}", " ".repeat(left), label, " ".repeat(pad - left))
        }
    }
}

/// Derives a canvas size in cells for a source image.
///
/// `font_ratio` is the width/height ratio of one cell in pixels (e.g.
/// 0.5 for a typical 8×16 font). Unset (< 1) destination dimensions are
/// derived from the source aspect; without `stretch` the set ones only
/// bound the result; without `zoom` the image is never enlarged beyond
/// one source pixel per cell pixel.
pub fn calc_canvas_geometry(
    src_width: usize,
    src_height: usize,
    dest_width: &mut i32,
    dest_height: &mut i32,
    font_ratio: f32,
    zoom: bool,
    stretch: bool,
) {
    if src_width == 0 || src_height == 0 {
        return;
    }

    // Source size expressed in cell units, correcting for cell aspect.
    let src_cells_w = src_width as f32 / 8.0;
    let src_cells_h = (src_height as f32 / 8.0) * font_ratio;

    if stretch && *dest_width > 0 && *dest_height > 0 {
        return;
    }

    let (mut w, mut h);
    match (*dest_width > 0, *dest_height > 0) {
        (false, false) => {
            w = src_cells_w;
            h = src_cells_h;
        }
        (true, false) => {
            w = *dest_width as f32;
            h = w * src_cells_h / src_cells_w;
        }
        (false, true) => {
            h = *dest_height as f32;
            w = h * src_cells_w / src_cells_h;
        }
        (true, true) => {
            let scale =
                (*dest_width as f32 / src_cells_w).min(*dest_height as f32 / src_cells_h);
            w = src_cells_w * scale;
            h = src_cells_h * scale;
        }
    }

    if !zoom {
        let scale = (src_cells_w / w).min(src_cells_h / h);
        if scale < 1.0 {
            w *= scale;
            h *= scale;
        }
    }

    *dest_width = (w.round() as i32).max(1);
    *dest_height = (h.round() as i32).max(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Rotation ────────────────────────────────────────────────────────

    fn pix(v: u8) -> [u8; 3] {
        [v, v, v]
    }

    fn grid_2x3() -> Vec<u8> {
        // 2 wide, 3 tall, values 1..=6 row-major.
        (1u8..=6).flat_map(pix).collect()
    }

    fn value_at(buf: &[u8], stride: usize, x: usize, y: usize) -> u8 {
        buf[y * stride + x * 3]
    }

    #[test]
    fn rotate_90_transposes() {
        let src = grid_2x3();
        let (out, w, h, stride) = rotate_image(&src, 2, 3, 6, 3, Rotation::R90);
        assert_eq!((w, h), (3, 2));
        // 1 2        5 3 1
        // 3 4   →    6 4 2
        // 5 6
        assert_eq!(value_at(&out, stride, 0, 0), 5);
        assert_eq!(value_at(&out, stride, 2, 0), 1);
        assert_eq!(value_at(&out, stride, 0, 1), 6);
        assert_eq!(value_at(&out, stride, 2, 1), 2);
    }

    #[test]
    fn rotate_180_reverses() {
        let src = grid_2x3();
        let (out, w, h, stride) = rotate_image(&src, 2, 3, 6, 3, Rotation::R180);
        assert_eq!((w, h), (2, 3));
        assert_eq!(value_at(&out, stride, 0, 0), 6);
        assert_eq!(value_at(&out, stride, 1, 2), 1);
    }

    #[test]
    fn mirror_flips_horizontally() {
        let src = grid_2x3();
        let (out, _, _, stride) = rotate_image(&src, 2, 3, 6, 3, Rotation::R0Mirror);
        assert_eq!(value_at(&out, stride, 0, 0), 2);
        assert_eq!(value_at(&out, stride, 1, 0), 1);
    }

    #[test]
    fn rotate_round_trip() {
        let src = grid_2x3();
        let (r90, w, h, stride) = rotate_image(&src, 2, 3, 6, 3, Rotation::R90);
        let (back, w2, h2, _) = rotate_image(&r90, w, h, stride, 3, Rotation::R90.invert());
        assert_eq!((w2, h2), (2, 3));
        assert_eq!(back, src);
    }

    #[test]
    fn rotation_respects_padded_rowstride() {
        // One row of padding byte per row.
        let mut src = Vec::new();
        for y in 0..2u8 {
            for x in 0..2u8 {
                src.extend_from_slice(&pix(y * 2 + x + 1));
            }
            src.push(0xEE);
        }
        let (out, w, h, _) = rotate_image(&src, 2, 2, 7, 3, Rotation::R0);
        assert_eq!((w, h), (2, 2));
        assert!(!out.contains(&0xEE));
    }

    // ── Ellipsize ───────────────────────────────────────────────────────

    #[test]
    fn ellipsize_short_strings_pass_through() {
        assert_eq!(ellipsize_string("abc", 10, true), "abc");
        assert_eq!(ellipsize_string("abc", 3, true), "abc");
    }

    #[test]
    fn ellipsize_truncates_with_marker() {
        assert_eq!(ellipsize_string("abcdef", 3, true), "abc\u{2026}");
        assert_eq!(ellipsize_string("abcdef", 3, false), "abc>");
    }

    #[test]
    fn ellipsize_is_char_based_not_byte_based() {
        assert_eq!(ellipsize_string("åäöåäö", 3, false), "åäö>");
    }

    #[test]
    fn label_line_alignments() {
        assert_eq!(label_line("/x/ab.png", Align::Start, 10, false), "ab.png    ");
        assert_eq!(label_line("/x/ab.png", Align::End, 10, false), "    ab.png");
        assert_eq!(label_line("/x/ab.png", Align::Center, 10, false), "  ab.png  ");
    }

    // ── Geometry ────────────────────────────────────────────────────────

    #[test]
    fn geometry_derives_both_dimensions() {
        let (mut w, mut h) = (-1, -1);
        calc_canvas_geometry(160, 160, &mut w, &mut h, 0.5, true, false);
        // 160 px → 20 cells wide, 10 rows tall at a 1:2 cell aspect.
        assert_eq!((w, h), (20, 10));
    }

    #[test]
    fn geometry_fits_within_bounds_preserving_aspect() {
        let (mut w, mut h) = (40, 40);
        calc_canvas_geometry(160, 160, &mut w, &mut h, 0.5, true, false);
        assert_eq!((w, h), (40, 20));
    }

    #[test]
    fn geometry_without_zoom_never_enlarges() {
        let (mut w, mut h) = (400, 400);
        calc_canvas_geometry(80, 80, &mut w, &mut h, 0.5, false, false);
        assert_eq!((w, h), (10, 5));
    }

    #[test]
    fn geometry_stretch_keeps_request() {
        let (mut w, mut h) = (33, 7);
        calc_canvas_geometry(160, 160, &mut w, &mut h, 0.5, true, true);
        assert_eq!((w, h), (33, 7));
    }
}
