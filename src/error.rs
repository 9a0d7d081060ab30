use thiserror::Error;

/// Library error type for the line-art filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The segmentation model could not be constructed.
    #[error("segmentation model failed to load: {0}")]
    ModelLoad(String),

    /// The frame source refused to start playback.
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),

    /// A transport control was used before any source was loaded.
    #[error("no video source loaded")]
    NoSource,

    /// The clip container is not one we can decode.
    #[error("unsupported clip format: {0}")]
    UnsupportedFormat(String),

    /// The clip decoded but contained no frames.
    #[error("clip contains no frames")]
    EmptyClip,

    /// Frames inside one clip disagree on their dimensions.
    #[error("frame {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    FrameSize {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Image decode/encode error.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
