mod driver;
mod texture;

pub use driver::{DecoderEvent, FrameDriver, PlaybackState};
pub use texture::VideoTexture;
