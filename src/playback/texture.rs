use image::RgbaImage;
use std::sync::Arc;

/// Live view of a source's current frame, as the render path samples it.
///
/// The driver only *requests* refreshes; the render path decides when the
/// pixels actually move, through [`VideoTexture::upload_if_needed`].
#[derive(Debug)]
pub struct VideoTexture {
    source_id: u64,
    width: u32,
    height: u32,
    pixels: Option<Arc<RgbaImage>>,
    needs_update: bool,
    uploads: u64,
}

impl VideoTexture {
    /// Bind a texture to a source of the given native size.
    pub fn bind(source_id: u64, width: u32, height: u32) -> Self {
        Self {
            source_id,
            width,
            height,
            pixels: None,
            needs_update: false,
            uploads: 0,
        }
    }

    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn request_update(&mut self) {
        self.needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Take `frame` as the new contents if a refresh was requested.
    ///
    /// Returns whether an upload happened.
    pub fn upload_if_needed(&mut self, frame: &Arc<RgbaImage>) -> bool {
        if !self.needs_update {
            return false;
        }
        self.pixels = Some(frame.clone());
        self.needs_update = false;
        self.uploads += 1;
        true
    }

    /// Pixels as of the last upload.
    pub fn view(&self) -> Option<&Arc<RgbaImage>> {
        self.pixels.as_ref()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_only_when_requested() {
        let frame = Arc::new(RgbaImage::new(2, 2));
        let mut texture = VideoTexture::bind(1, 2, 2);
        assert!(!texture.upload_if_needed(&frame));
        assert!(texture.view().is_none());

        texture.request_update();
        assert!(texture.upload_if_needed(&frame));
        assert!(!texture.upload_if_needed(&frame));
        assert_eq!(texture.uploads(), 1);
        assert!(Arc::ptr_eq(texture.view().unwrap(), &frame));
    }
}
