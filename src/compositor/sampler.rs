//! Normalized-coordinate texture sampling.
//!
//! Everything the compositor reads goes through here, addressed by `(u, v)` in
//! [0, 1]. Two textures of different resolutions sampled at the same `(u, v)`
//! refer to the same logical point; no raw pixel index ever crosses textures.

use image::RgbaImage;

/// A 2D grid of RGBA texels in [0, 1].
pub trait Texture {
    fn size(&self) -> (u32, u32);

    /// Texel at integer coordinates. Callers stay inside `size()`.
    fn texel(&self, x: u32, y: u32) -> [f32; 4];
}

impl Texture for RgbaImage {
    fn size(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let p = self.get_pixel(x, y);
        [
            f32::from(p[0]) / 255.0,
            f32::from(p[1]) / 255.0,
            f32::from(p[2]) / 255.0,
            f32::from(p[3]) / 255.0,
        ]
    }
}

/// Bilinear sample with clamp-to-edge addressing, texel centers at `(i + 0.5) / n`.
///
/// Coordinates outside [0, 1] clamp; empty textures sample as transparent black.
pub fn sample<T: Texture + ?Sized>(texture: &T, u: f32, v: f32) -> [f32; 4] {
    let (width, height) = texture.size();
    if width == 0 || height == 0 {
        return [0.0; 4];
    }

    let (x0, x1, fx) = axis(u, width);
    let (y0, y1, fy) = axis(v, height);

    let a = texture.texel(x0, y0);
    let b = texture.texel(x1, y0);
    let c = texture.texel(x0, y1);
    let d = texture.texel(x1, y1);

    let mut out = [0.0; 4];
    for i in 0..4 {
        let top = a[i] + (b[i] - a[i]) * fx;
        let bottom = c[i] + (d[i] - c[i]) * fx;
        out[i] = top + (bottom - top) * fy;
    }
    out
}

/// Neighbouring texel indices and blend weight along one axis.
fn axis(coord: f32, len: u32) -> (u32, u32, f32) {
    let coord = if coord.is_finite() { coord } else { 0.0 };
    let max = (len - 1) as f32;
    let pos = (coord * len as f32 - 0.5).clamp(0.0, max);
    let lo = pos.floor();
    let hi = (lo + 1.0).min(max);
    (lo as u32, hi as u32, pos - lo)
}
