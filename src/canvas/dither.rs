//! Dither pattern generation: Bayer matrices for ordered mode and a
//! once-per-process deterministic noise texture.

use std::sync::OnceLock;

use crate::canvas::config::DitherMode;

pub const NOISE_DIM: usize = 64;

/// Base amplitude of one dither step in working-space units, scaled by the
/// configured intensity.
const STEP: f32 = 20.0;

/// n×n Bayer matrix (n a power of two), normalized to [-0.5, 0.5).
pub fn bayer_matrix(n: usize) -> Vec<f32> {
    assert!(n.is_power_of_two() && n <= 8);

    let mut size = 1;
    let mut m: Vec<u32> = vec![0];
    while size < n {
        let next = size * 2;
        let mut out = vec![0u32; next * next];
        for y in 0..size {
            for x in 0..size {
                let v = 4 * m[y * size + x];
                out[y * next + x] = v;
                out[y * next + x + size] = v + 2;
                out[(y + size) * next + x] = v + 3;
                out[(y + size) * next + x + size] = v + 1;
            }
        }
        m = out;
        size = next;
    }

    let denom = (n * n) as f32;
    m.iter().map(|&v| (v as f32 + 0.5) / denom - 0.5).collect()
}

/// 64×64×3 noise texture from an R2 low-discrepancy sequence; built once
/// per process. Deterministic by construction.
pub fn noise_texture() -> &'static [[f32; 3]] {
    static TEXTURE: OnceLock<Vec<[f32; 3]>> = OnceLock::new();
    TEXTURE.get_or_init(|| {
        // Plastic-constant pair; decorrelate channels by a fixed phase.
        const A1: f64 = 0.754_877_666_2;
        const A2: f64 = 0.569_840_290_9;

        let mut out = Vec::with_capacity(NOISE_DIM * NOISE_DIM);
        for y in 0..NOISE_DIM {
            for x in 0..NOISE_DIM {
                let mut px = [0.0f32; 3];
                for (ch, p) in px.iter_mut().enumerate() {
                    let v = (x as f64 + 1.0) * A1
                        + (y as f64 + 1.0) * A2
                        + ch as f64 * 0.337;
                    *p = (v.fract() - 0.5) as f32;
                }
                out.push(px);
            }
        }
        out
    })
}

/// Precomputed dither state for one canvas run.
pub enum Dither {
    None,
    Ordered {
        matrix: Vec<f32>,
        n: usize,
        grain: (usize, usize),
        amplitude: f32,
    },
    Noise {
        grain: (usize, usize),
        amplitude: f32,
    },
    Diffusion,
}

impl Dither {
    pub fn new(mode: DitherMode, grain: (usize, usize), intensity: f32) -> Self {
        match mode {
            DitherMode::None => Dither::None,
            DitherMode::Ordered => {
                let n = grain.0.max(grain.1).max(2);
                Dither::Ordered {
                    matrix: bayer_matrix(n),
                    n,
                    grain,
                    amplitude: STEP * intensity,
                }
            }
            DitherMode::Noise => Dither::Noise {
                grain,
                amplitude: STEP * intensity,
            },
            DitherMode::Diffusion => Dither::Diffusion,
        }
    }

    /// Additive working-space offset for the cell at pixel position
    /// (px, py). None and Diffusion contribute nothing here.
    pub fn offset(&self, px: usize, py: usize) -> [f32; 3] {
        match self {
            Dither::None | Dither::Diffusion => [0.0; 3],
            Dither::Ordered {
                matrix,
                n,
                grain,
                amplitude,
            } => {
                let gx = (px / grain.0) % n;
                let gy = (py / grain.1) % n;
                let v = matrix[gy * n + gx] * amplitude;
                [v, v, v]
            }
            Dither::Noise { grain, amplitude } => {
                let gx = (px / grain.0) % NOISE_DIM;
                let gy = (py / grain.1) % NOISE_DIM;
                let t = noise_texture()[gy * NOISE_DIM + gx];
                [t[0] * amplitude, t[1] * amplitude, t[2] * amplitude]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bayer_is_a_permutation() {
        for n in [2usize, 4, 8] {
            let m = bayer_matrix(n);
            assert_eq!(m.len(), n * n);
            let mut vals: Vec<i32> = m
                .iter()
                .map(|&v| ((v + 0.5) * (n * n) as f32 - 0.5).round() as i32)
                .collect();
            vals.sort();
            let expected: Vec<i32> = (0..(n * n) as i32).collect();
            assert_eq!(vals, expected);
        }
    }

    #[test]
    fn bayer_2x2_order() {
        let m = bayer_matrix(2);
        let ranks: Vec<i32> = m.iter().map(|&v| ((v + 0.5) * 4.0 - 0.5).round() as i32).collect();
        assert_eq!(ranks, vec![0, 2, 3, 1]);
    }

    #[test]
    fn noise_texture_is_stable_and_centered() {
        let a = noise_texture();
        let b = noise_texture();
        assert_eq!(a.as_ptr(), b.as_ptr());

        let mean: f32 =
            a.iter().map(|px| px[0]).sum::<f32>() / (NOISE_DIM * NOISE_DIM) as f32;
        assert!(mean.abs() < 0.05);
        assert!(a.iter().all(|px| px.iter().all(|&v| (-0.5..=0.5).contains(&v))));
    }

    #[test]
    fn offsets_are_zero_for_none_and_diffusion() {
        let d = Dither::new(DitherMode::None, (4, 4), 1.0);
        assert_eq!(d.offset(3, 9), [0.0; 3]);
        let d = Dither::new(DitherMode::Diffusion, (4, 4), 1.0);
        assert_eq!(d.offset(3, 9), [0.0; 3]);
    }
}
