//! Real-time line-art video filter.
//!
//! A person-segmentation model refreshes a mask at a throttled rate while a
//! per-pixel compositor draws every frame: Sobel line art where the mask says
//! "person", a muted copy of the video everywhere else.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod segmentation;
pub mod session;

pub use error::FilterError;
pub use session::FilterSession;
