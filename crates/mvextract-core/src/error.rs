//! Error types for capture sessions.

use std::fmt;

use thiserror::Error;

/// A failure reported by the native demux/decode/convert library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    /// What the session asked the backend to do, e.g. "open input".
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl fmt::Display) -> Self {
        Self {
            operation,
            message: message.to_string(),
        }
    }
}

/// Errors surfaced by [`VideoCap`](crate::video::capture::VideoCap).
///
/// Every variant is recoverable: `release()` followed by a new `open()` puts
/// the session back into a usable state.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The session has no open input.
    #[error("capture is not open")]
    NotOpen,

    /// The input could not be opened or its decoder could not be set up.
    #[error("failed to open '{url}'")]
    Open {
        url: String,
        #[source]
        source: BackendError,
    },

    /// The input contains no video stream.
    #[error("no video stream found in '{url}'")]
    NoVideoStream { url: String },

    /// The container's declared frame count has been reached.
    #[error("end of stream after {frames} frames")]
    EndOfStream { frames: u64 },

    /// Too many consecutive reads produced no decoded frame.
    #[error("no frame decoded after {attempts} non-productive attempts")]
    RetryLimit { attempts: u32 },

    /// `retrieve` was called before a frame was decoded.
    #[error("no decoded frame available")]
    NoFrame,

    /// Color-space conversion of the decoded frame failed.
    #[error("color conversion failed")]
    Conversion(#[source] BackendError),

    /// The converted plane is smaller than the picture it should hold.
    #[error("converted plane holds {actual} bytes, {expected} required for {width}x{height}")]
    ShortBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The motion-vector buffer could not be allocated.
    #[error("failed to allocate buffer for {count} motion vectors")]
    Allocation { count: usize },
}
