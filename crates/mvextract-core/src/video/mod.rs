pub mod backend;
pub mod capture;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
mod grab;
pub mod motion;
mod retrieve;
#[cfg(test)]
pub(crate) mod scripted;
pub mod sync;

pub use backend::{Backend, StreamInfo};
pub use capture::{is_live_protocol, VideoCap};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegBackend;
pub use frame::{FrameType, FrameView, Plane, Retrieved};
pub use motion::{flatten, MotionVector, MOTION_VECTOR_COLUMNS};
pub use sync::{SenderReport, SyncPoint};
