use super::sampler::{self, Texture};

/// Rec. 601 luma weights.
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

pub fn luminance(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA[0] + rgb[1] * LUMA[1] + rgb[2] * LUMA[2]
}

/// Sobel gradient magnitude of luminance around `(u, v)`.
///
/// `texel` is the size of one source pixel in normalized units.
pub fn magnitude<T: Texture + ?Sized>(texture: &T, u: f32, v: f32, texel: (f32, f32)) -> f32 {
    let mut gx = 0.0;
    let mut gy = 0.0;
    for (row, dy) in (-1..=1).enumerate() {
        for (col, dx) in (-1..=1).enumerate() {
            let s = sampler::sample(
                texture,
                u + dx as f32 * texel.0,
                v + dy as f32 * texel.1,
            );
            let lum = luminance([s[0], s[1], s[2]]);
            gx += SOBEL_X[row][col] * lum;
            gy += SOBEL_Y[row][col] * lum;
        }
    }
    (gx * gx + gy * gy).sqrt()
}
