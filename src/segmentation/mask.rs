use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tokio::sync::watch;

use super::types::ProbabilityMap;
use crate::compositor::sampler;

/// Grayscale person mask, stored as RGBA8 so it samples like any colour texture.
///
/// All four channels carry the same value; 0 = background, 255 = person.
/// `version` bumps on every content change so consumers can tell a refreshed
/// texture from a stale one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskTexture {
    image: RgbaImage,
    version: u64,
}

impl MaskTexture {
    /// The all-background mask published before any inference lands.
    pub fn background() -> Self {
        Self::blank(1, 1)
    }

    /// All-zero mask of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width.max(1), height.max(1)),
            version: 0,
        }
    }

    pub fn from_probabilities(map: &ProbabilityMap) -> Self {
        let (width, height) = map.dimensions();
        let mut texture = Self::blank(width, height);
        texture.fill_from(map);
        texture
    }

    /// Overwrite the pixels in place when `map` has the same size.
    ///
    /// Returns `false`, leaving the texture untouched, on a size mismatch.
    pub fn overwrite(&mut self, map: &ProbabilityMap) -> bool {
        if map.dimensions() != self.image.dimensions() {
            return false;
        }
        self.fill_from(map);
        self.version += 1;
        true
    }

    fn fill_from(&mut self, map: &ProbabilityMap) {
        for (pixel, &p) in self.image.pixels_mut().zip(map.values()) {
            let value = (p.clamp(0.0, 1.0) * 255.0).round() as u8;
            *pixel = Rgba([value; 4]);
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Mask intensity in [0, 1] at normalized coordinates (bilinear, clamp-to-edge).
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        sampler::sample(&self.image, u, v)[0]
    }

    /// Grayscale visualization, stretched to `width`x`height`.
    pub fn to_rgba(&self, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            let value = (self.sample(u, v) * 255.0).round() as u8;
            Rgba([value, value, value, 255])
        })
    }
}

impl Default for MaskTexture {
    fn default() -> Self {
        Self::background()
    }
}

/// How a publication reached the consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    /// The published buffer was rewritten in place.
    Overwritten,
    /// A new buffer was allocated (first mask, size change, or a reader still
    /// held the previous one).
    Reallocated,
}

/// Single-producer side of the mask channel.
pub struct MaskPublisher {
    tx: watch::Sender<Arc<MaskTexture>>,
}

impl MaskPublisher {
    /// Create the channel, seeded with the all-background mask.
    pub fn new() -> (Self, watch::Receiver<Arc<MaskTexture>>) {
        let (tx, rx) = watch::channel(Arc::new(MaskTexture::background()));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MaskTexture>> {
        self.tx.subscribe()
    }

    /// Replace the published mask with `map`.
    pub fn publish(&self, map: &ProbabilityMap) -> Publication {
        let mut outcome = Publication::Reallocated;
        self.tx.send_modify(|current| {
            if let Some(texture) = Arc::get_mut(current) {
                if texture.overwrite(map) {
                    outcome = Publication::Overwritten;
                    return;
                }
            }
            let mut fresh = MaskTexture::from_probabilities(map);
            fresh.version = current.version + 1;
            *current = Arc::new(fresh);
        });
        outcome
    }

    /// Drop the current buffer and fall back to the background mask.
    pub fn release(&self) {
        let version = self.tx.borrow().version + 1;
        let mut background = MaskTexture::background();
        background.version = version;
        self.tx.send_replace(Arc::new(background));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mask_is_background_everywhere() {
        let mask = MaskTexture::default();
        for &(u, v) in &[(0.0, 0.0), (0.5, 0.5), (1.0, 1.0), (-3.0, 7.0)] {
            assert!(mask.sample(u, v) <= 0.5);
        }
    }

    #[test]
    fn probabilities_become_equal_channels() {
        let map = ProbabilityMap::new(2, 1, vec![0.0, 1.0]).unwrap();
        let mask = MaskTexture::from_probabilities(&map);
        assert_eq!(mask.as_raw(), &[0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn samples_read_the_backing_image() {
        let map = ProbabilityMap::new(2, 1, vec![0.0, 1.0]).unwrap();
        let mask = MaskTexture::from_probabilities(&map);
        assert_eq!(*mask.image().get_pixel(1, 0), Rgba([255; 4]));
        // texel centers land exactly on the stored values
        assert_eq!(mask.sample(0.25, 0.5), 0.0);
        assert_eq!(mask.sample(0.75, 0.5), 1.0);
        assert!((mask.sample(0.5, 0.5) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn publish_overwrites_same_size_buffer_in_place() {
        let (publisher, rx) = MaskPublisher::new();
        let first = ProbabilityMap::filled(4, 3, 1.0);
        assert_eq!(publisher.publish(&first), Publication::Reallocated);
        let before = rx.borrow().as_raw().as_ptr();
        let version = rx.borrow().version();

        let second = ProbabilityMap::filled(4, 3, 0.0);
        assert_eq!(publisher.publish(&second), Publication::Overwritten);
        let current = rx.borrow();
        assert_eq!(current.as_raw().as_ptr(), before);
        assert_eq!(current.version(), version + 1);
        assert!(current.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn publish_reallocates_on_size_change_or_live_snapshot() {
        let (publisher, rx) = MaskPublisher::new();
        publisher.publish(&ProbabilityMap::filled(4, 3, 1.0));

        let snapshot = rx.borrow().clone();
        assert_eq!(
            publisher.publish(&ProbabilityMap::filled(4, 3, 0.0)),
            Publication::Reallocated
        );
        // the reader's snapshot is untouched
        assert!(snapshot.as_raw().iter().all(|&b| b == 255));
        drop(snapshot);

        assert_eq!(
            publisher.publish(&ProbabilityMap::filled(2, 2, 1.0)),
            Publication::Reallocated
        );
        assert_eq!(rx.borrow().dimensions(), (2, 2));
    }

    #[test]
    fn release_restores_background() {
        let (publisher, rx) = MaskPublisher::new();
        publisher.publish(&ProbabilityMap::filled(2, 2, 1.0));
        publisher.release();
        let mask = rx.borrow().clone();
        assert_eq!(mask.dimensions(), (1, 1));
        assert!(mask.sample(0.5, 0.5) <= 0.5);
    }
}
