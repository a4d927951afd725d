pub mod capture;

pub use capture::{CaptureConfig, RtspTransport};
