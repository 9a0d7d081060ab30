use super::OutputSink;
use anyhow::{ensure, Context, Result};
use image::RgbaImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC, Format};

/// Streams frames to a v4l2loopback device so other programs see a webcam
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Negotiate YUYV at the requested size before streaming raw frames
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Format::new(width, height, FourCC::new(b"YUYV"));
        let applied = Output::set_format(&device, &format)
            .context("Failed to set v4l2loopback output format")?;
        tracing::debug!("v4l2loopback format: {:?}", applied);

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Convert an RGBA frame to packed YUYV (4:2:2)
    fn rgba_to_yuyv(frame: &RgbaImage) -> Vec<u8> {
        let (width, height) = frame.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let p1 = frame.get_pixel(x, y);
                let p2 = if x + 1 < width {
                    frame.get_pixel(x + 1, y)
                } else {
                    p1
                };

                let (y1, u1, v1) = rgb_to_yuv(p1[0], p1[1], p1[2]);
                let (y2, u2, v2) = rgb_to_yuv(p2[0], p2[1], p2[2]);

                // chroma is shared by the pixel pair
                let u = ((u16::from(u1) + u16::from(u2)) / 2) as u8;
                let v = ((u16::from(v1) + u16::from(v2)) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = f32::from(r);
    let g = f32::from(g);
    let b = f32::from(b);

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        ensure!(
            frame.dimensions() == (self.width, self.height),
            "frame is {}x{}, device expects {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );

        self.file
            .write_all(&Self::rgba_to_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_pack_to_expected_luma() {
        let frame = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let packed = V4L2Output::rgba_to_yuyv(&frame);
        assert_eq!(packed.len(), 4);
        assert!(packed[0] >= 254);
        assert_eq!(packed[2], 0);
    }
}
