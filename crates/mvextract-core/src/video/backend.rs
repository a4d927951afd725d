//! The native media capabilities a capture session drives.
//!
//! Demuxing, decoding and color conversion are provided by a native library.
//! A [`Backend`] hands out the individual resources; the session owns them and
//! decides when each is created and released.

use std::fmt::Debug;
use std::time::Duration;

use crate::config::RtspTransport;
use crate::error::BackendError;

use super::frame::{FrameType, Plane};
use super::sync::SyncPoint;

/// Protocol options applied when opening an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOptions {
    pub transport: RtspTransport,
    pub connect_timeout: Duration,
}

/// The video stream selected for decoding, as declared by the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    /// Encoder-declared width, 0 if unknown.
    pub width: u32,
    /// Encoder-declared height, 0 if unknown.
    pub height: u32,
    /// Total frames the container declares, None if not declared.
    pub frame_count: Option<u64>,
    pub codec_name: String,
}

/// Settings the decoder is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSettings {
    pub thread_count: usize,
    /// Ask the decoder to attach motion vectors to every frame as side data.
    pub export_motion_vectors: bool,
}

/// Picture dimensions currently reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    /// Display width.
    pub width: u32,
    /// Display height.
    pub height: u32,
    /// Width of the decoded buffers, at least `width`.
    pub coded_width: u32,
    /// Height of the decoded buffers, at least `height`.
    pub coded_height: u32,
}

/// Identifies a conversion context: source layout and size. The target is
/// always packed RGB24 at the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionKey<F> {
    pub source_format: F,
    pub width: u32,
    pub height: u32,
}

/// Result of one demuxer read.
#[derive(Debug)]
pub enum ReadOutcome<P> {
    Packet(P),
    /// Nothing available right now; retry immediately.
    Again,
    EndOfStream,
    Failed(BackendError),
}

pub trait DemuxedPacket {
    fn stream_index(&self) -> usize;

    /// Sender-report mapping for this packet, once the sender has sent one.
    fn sync_point(&self) -> Option<SyncPoint>;
}

/// An opened and probed input.
pub trait Demuxer {
    type Packet: DemuxedPacket;

    /// Comma-separated list of format names of the input.
    fn format_name(&self) -> String;

    fn best_video_stream(&self) -> Option<StreamInfo>;

    fn read_packet(&mut self) -> ReadOutcome<Self::Packet>;
}

/// A decoded picture in the decoder's native layout.
pub trait RawFrame {
    /// True once the frame holds picture data.
    fn is_populated(&self) -> bool;

    fn frame_type(&self) -> FrameType;

    /// Call `visit` with the raw motion-vector side data, if the frame carries
    /// any. The bytes are records in the `AVMotionVector` layout.
    fn with_motion_side_data<R>(&self, visit: impl FnOnce(&[u8]) -> R) -> Option<R>;
}

pub trait Decoder {
    type Packet;
    type Frame;
    type Format: Copy + PartialEq + Debug;

    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), BackendError>;

    /// Signal that no more packets follow so buffered frames are released.
    fn send_eof(&mut self) -> Result<(), BackendError>;

    /// Write the next decoded frame into `frame`. Ok(false) means the decoder
    /// needs more input or is fully drained.
    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<bool, BackendError>;

    fn geometry(&self) -> Geometry;

    fn pixel_format(&self) -> Self::Format;
}

/// A cached color-space conversion context with its reusable output buffer.
pub trait Converter {
    type Frame;

    /// Convert all coded rows of `frame` and return the output plane. The plane
    /// aliases the converter's buffer and is overwritten by the next call.
    fn convert(&mut self, frame: &Self::Frame) -> Result<Plane<'_>, BackendError>;
}

/// Factory for the native resources of one session.
pub trait Backend {
    type Packet: DemuxedPacket;
    type Frame: RawFrame;
    type Format: Copy + PartialEq + Debug;
    type Input: Demuxer<Packet = Self::Packet>;
    type Decoder: Decoder<Packet = Self::Packet, Frame = Self::Frame, Format = Self::Format>;
    type Converter: Converter<Frame = Self::Frame>;

    /// Open and probe `url`.
    fn open_input(&self, url: &str, options: &ProtocolOptions) -> Result<Self::Input, BackendError>;

    fn open_decoder(
        &self,
        input: &Self::Input,
        stream: &StreamInfo,
        settings: &DecoderSettings,
    ) -> Result<Self::Decoder, BackendError>;

    fn new_converter(
        &self,
        key: &ConversionKey<Self::Format>,
    ) -> Result<Self::Converter, BackendError>;

    fn alloc_frame(&self) -> Self::Frame;
}
