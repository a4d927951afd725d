//! H.264 decoding with motion-vector extraction and sender-clock timestamps.

pub mod config;
pub mod debug;
pub mod error;
pub mod ntp;
pub mod pipeline;
pub mod video;

pub use config::{CaptureConfig, RtspTransport};
pub use error::{BackendError, CaptureError};
pub use video::{FrameType, FrameView, MotionVector, Retrieved, VideoCap};
