//! Scaling of source pixels into the canvas work buffer.
//!
//! Premultiplied alpha is required in this space; unassociated input is
//! converted on read. Each axis picks its filter independently: box
//! averaging when shrinking, a Catmull-Rom cubic when enlarging.

use crate::canvas::config::PixelType;

/// One work-buffer pixel: premultiplied RGBA, 0..=255 per channel.
pub type WorkPixel = [f32; 4];

pub fn resample(
    src: &[u8],
    pixel_type: PixelType,
    src_width: usize,
    src_height: usize,
    rowstride: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<WorkPixel> {
    assert!(src_width > 0 && src_height > 0);
    assert!(dst_width > 0 && dst_height > 0);

    let bpp = pixel_type.bytes_per_pixel();
    let mut rows: Vec<WorkPixel> = Vec::with_capacity(src_width * src_height);
    for y in 0..src_height {
        let row = &src[y * rowstride..];
        for x in 0..src_width {
            let px = pixel_type.read_rgba_premultiplied(&row[x * bpp..x * bpp + bpp]);
            rows.push([px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32]);
        }
    }

    let horizontal = resample_axis(&rows, src_width, src_height, dst_width, true);
    let mut out = resample_axis(&horizontal, dst_width, src_height, dst_height, false);

    // Cubic overshoot can break the premultiplied invariant; pin color
    // channels back under alpha.
    for px in &mut out {
        px[3] = px[3].clamp(0.0, 255.0);
        for c in 0..3 {
            px[c] = px[c].clamp(0.0, px[3]);
        }
    }
    out
}

/// Resize one axis. `horizontal` picks which dimension `len` applies to;
/// the other dimension is carried through unchanged.
fn resample_axis(
    src: &[WorkPixel],
    width: usize,
    height: usize,
    new_len: usize,
    horizontal: bool,
) -> Vec<WorkPixel> {
    let (src_len, lanes) = if horizontal {
        (width, height)
    } else {
        (height, width)
    };

    let fetch = |lane: usize, i: usize| -> WorkPixel {
        if horizontal {
            src[lane * width + i]
        } else {
            src[i * width + lane]
        }
    };

    let (out_w, out_h) = if horizontal {
        (new_len, height)
    } else {
        (width, new_len)
    };
    let mut out = vec![[0.0f32; 4]; out_w * out_h];
    let mut store = |lane: usize, i: usize, px: WorkPixel| {
        if horizontal {
            out[lane * out_w + i] = px;
        } else {
            out[i * out_w + lane] = px;
        }
    };

    if new_len == src_len {
        for lane in 0..lanes {
            for i in 0..src_len {
                store(lane, i, fetch(lane, i));
            }
        }
    } else if new_len < src_len {
        // Box average over the fractional source span of each target slot.
        let scale = src_len as f32 / new_len as f32;
        for lane in 0..lanes {
            for i in 0..new_len {
                let lo = i as f32 * scale;
                let hi = (i + 1) as f32 * scale;
                let mut acc = [0.0f32; 4];
                let mut weight = 0.0f32;

                let first = lo.floor() as usize;
                let last = (hi.ceil() as usize).min(src_len);
                for j in first..last {
                    let cov = (hi.min((j + 1) as f32) - lo.max(j as f32)).max(0.0);
                    let px = fetch(lane, j);
                    for c in 0..4 {
                        acc[c] += px[c] * cov;
                    }
                    weight += cov;
                }
                if weight > 0.0 {
                    for c in &mut acc {
                        *c /= weight;
                    }
                }
                store(lane, i, acc);
            }
        }
    } else {
        // Catmull-Rom upsample.
        let scale = src_len as f32 / new_len as f32;
        for lane in 0..lanes {
            for i in 0..new_len {
                let center = (i as f32 + 0.5) * scale - 0.5;
                let base = center.floor() as isize;
                let t = center - base as f32;

                let mut acc = [0.0f32; 4];
                for (k, tap) in (-1isize..=2).enumerate() {
                    let j = (base + tap).clamp(0, src_len as isize - 1) as usize;
                    let w = catmull_rom(t - (k as f32 - 1.0));
                    let px = fetch(lane, j);
                    for c in 0..4 {
                        acc[c] += px[c] * w;
                    }
                }
                store(lane, i, acc);
            }
        }
    }

    out
}

fn catmull_rom(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}
