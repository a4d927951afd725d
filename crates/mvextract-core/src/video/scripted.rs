//! In-memory backend that replays a fixed packet script. Used by tests to
//! drive a capture session without a native media library.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::BackendError;
use crate::ntp::{NtpTimestamp, WallClock};

use super::backend::{
    Backend, ConversionKey, Converter, Decoder, DecoderSettings, DemuxedPacket, Demuxer, Geometry,
    ProtocolOptions, RawFrame, ReadOutcome, StreamInfo,
};
use super::frame::{FrameType, Plane, BYTES_PER_PIXEL};
use super::motion::NativeMotionVector;
use super::sync::{SenderReport, SyncPoint};

pub(crate) const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;
/// Bytes of padding the scripted converter adds after every row.
pub(crate) const ROW_PADDING: usize = 4;

/// A picture the scripted decoder will output for a video packet.
#[derive(Debug, Clone, Default)]
pub(crate) struct Picture {
    pub frame_type: FrameType,
    pub motion: Vec<NativeMotionVector>,
    pub has_side_data: bool,
    /// Value every converted byte is set to.
    pub fill: u8,
}

#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// A video packet; `None` decodes to nothing.
    Video {
        picture: Option<Picture>,
        sync: Option<SyncPoint>,
    },
    /// A packet of another stream.
    Other,
    Again,
    Fail,
}

impl Step {
    pub fn intra() -> Self {
        Step::Video {
            picture: Some(Picture {
                frame_type: FrameType::I,
                ..Picture::default()
            }),
            sync: None,
        }
    }

    /// A P-frame carrying `count` motion vectors.
    pub fn predicted(count: usize) -> Self {
        let motion = (0..count)
            .map(|i| NativeMotionVector {
                source: -1,
                w: 16,
                h: 16,
                src_x: 8 + i as i16,
                src_y: 8,
                dst_x: 8,
                dst_y: 8,
                flags: 0,
                motion_x: 4 * i as i32,
                motion_y: 0,
                motion_scale: 4,
            })
            .collect();
        Step::Video {
            picture: Some(Picture {
                frame_type: FrameType::P,
                motion,
                has_side_data: count > 0,
                fill: 0,
            }),
            sync: None,
        }
    }

    pub fn other() -> Self {
        Step::Other
    }

    /// A video packet the decoder accepts without producing a picture.
    pub fn undecodable() -> Self {
        Step::Video {
            picture: None,
            sync: None,
        }
    }

    pub fn with_sync(self, sync: SyncPoint) -> Self {
        match self {
            Step::Video { picture, .. } => Step::Video {
                picture,
                sync: Some(sync),
            },
            other => other,
        }
    }

    pub fn with_fill(self, fill: u8) -> Self {
        match self {
            Step::Video {
                picture: Some(mut picture),
                sync,
            } => {
                picture.fill = fill;
                Step::Video {
                    picture: Some(picture),
                    sync,
                }
            }
            other => other,
        }
    }
}

/// A sync point whose report sits at `unix_seconds`.
pub(crate) fn sync_at(unix_seconds: i64, report_rtp: u32, rtp: u32) -> SyncPoint {
    SyncPoint {
        report: SenderReport {
            ntp_time: NtpTimestamp::from_wall_clock(WallClock::new(unix_seconds, 0)),
            rtp_timestamp: report_rtp,
        },
        rtp_timestamp: rtp,
    }
}

/// Everything a scripted input will do once opened.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub format_name: String,
    pub stream: Option<StreamInfo>,
    pub steps: Vec<Step>,
    pub fail_open: bool,
    pub fail_decoder: bool,
    /// Pictures the decoder holds back before emitting the first one.
    pub decoder_delay: usize,
}

impl Script {
    pub fn file(steps: Vec<Step>) -> Self {
        Self {
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            stream: Some(StreamInfo {
                index: VIDEO_STREAM,
                width: 60,
                height: 40,
                frame_count: None,
                codec_name: "h264".to_string(),
            }),
            steps,
            fail_open: false,
            fail_decoder: false,
            decoder_delay: 0,
        }
    }

    pub fn live(steps: Vec<Step>) -> Self {
        Self {
            format_name: "rtsp".to_string(),
            ..Self::file(steps)
        }
    }

    pub fn missing() -> Self {
        Self {
            fail_open: true,
            ..Self::file(Vec::new())
        }
    }
}

/// Observations shared between a test and the backend's resources.
#[derive(Debug)]
pub(crate) struct Probe {
    dropped: RefCell<Vec<&'static str>>,
    converters_built: Cell<usize>,
    geometry: Cell<Geometry>,
    pixel_format: Cell<&'static str>,
    decoder_settings: RefCell<Option<DecoderSettings>>,
    protocol_options: RefCell<Option<ProtocolOptions>>,
}

impl Probe {
    fn log_drop(&self, what: &'static str) {
        self.dropped.borrow_mut().push(what);
    }

    /// Resources dropped so far, in order.
    pub fn dropped(&self) -> Vec<&'static str> {
        self.dropped.borrow().clone()
    }

    pub fn converters_built(&self) -> usize {
        self.converters_built.get()
    }

    pub fn set_geometry(&self, geometry: Geometry) {
        self.geometry.set(geometry);
    }

    pub fn set_pixel_format(&self, format: &'static str) {
        self.pixel_format.set(format);
    }

    pub fn decoder_settings(&self) -> Option<DecoderSettings> {
        self.decoder_settings.borrow().clone()
    }

    pub fn protocol_options(&self) -> Option<ProtocolOptions> {
        self.protocol_options.borrow().clone()
    }
}

pub(crate) struct ScriptedBackend {
    script: Script,
    probe: Rc<Probe>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> (Self, Rc<Probe>) {
        let probe = Rc::new(Probe {
            dropped: RefCell::new(Vec::new()),
            converters_built: Cell::new(0),
            geometry: Cell::new(Geometry {
                width: 60,
                height: 40,
                coded_width: 64,
                coded_height: 48,
            }),
            pixel_format: Cell::new("yuv420p"),
            decoder_settings: RefCell::new(None),
            protocol_options: RefCell::new(None),
        });
        (
            Self {
                script,
                probe: Rc::clone(&probe),
            },
            probe,
        )
    }
}

pub(crate) struct ScriptedPacket {
    stream_index: usize,
    picture: Option<Picture>,
    sync: Option<SyncPoint>,
}

impl DemuxedPacket for ScriptedPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn sync_point(&self) -> Option<SyncPoint> {
        self.sync
    }
}

pub(crate) struct ScriptedInput {
    format_name: String,
    stream: Option<StreamInfo>,
    steps: VecDeque<Step>,
    probe: Rc<Probe>,
}

impl Demuxer for ScriptedInput {
    type Packet = ScriptedPacket;

    fn format_name(&self) -> String {
        self.format_name.clone()
    }

    fn best_video_stream(&self) -> Option<StreamInfo> {
        self.stream.clone()
    }

    fn read_packet(&mut self) -> ReadOutcome<ScriptedPacket> {
        match self.steps.pop_front() {
            None => ReadOutcome::EndOfStream,
            Some(Step::Again) => ReadOutcome::Again,
            Some(Step::Fail) => ReadOutcome::Failed(BackendError::new("read packet", "I/O error")),
            Some(Step::Other) => ReadOutcome::Packet(ScriptedPacket {
                stream_index: AUDIO_STREAM,
                picture: None,
                sync: None,
            }),
            Some(Step::Video { picture, sync }) => ReadOutcome::Packet(ScriptedPacket {
                stream_index: VIDEO_STREAM,
                picture,
                sync,
            }),
        }
    }
}

impl Drop for ScriptedInput {
    fn drop(&mut self) {
        self.probe.log_drop("input");
    }
}

pub(crate) struct ScriptedDecoder {
    queue: VecDeque<Picture>,
    delay: usize,
    eof: bool,
    probe: Rc<Probe>,
}

impl Decoder for ScriptedDecoder {
    type Packet = ScriptedPacket;
    type Frame = ScriptedFrame;
    type Format = &'static str;

    fn send_packet(&mut self, packet: &ScriptedPacket) -> Result<(), BackendError> {
        if self.eof {
            return Err(BackendError::new("send packet", "End of file"));
        }
        if let Some(picture) = &packet.picture {
            self.queue.push_back(picture.clone());
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut ScriptedFrame) -> Result<bool, BackendError> {
        frame.picture = None;
        if self.queue.len() > self.delay || (self.eof && !self.queue.is_empty()) {
            frame.picture = self.queue.pop_front();
            return Ok(true);
        }
        Ok(false)
    }

    fn geometry(&self) -> Geometry {
        self.probe.geometry.get()
    }

    fn pixel_format(&self) -> &'static str {
        self.probe.pixel_format.get()
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.probe.log_drop("decoder");
    }
}

pub(crate) struct ScriptedFrame {
    picture: Option<Picture>,
    probe: Rc<Probe>,
}

impl RawFrame for ScriptedFrame {
    fn is_populated(&self) -> bool {
        self.picture.is_some()
    }

    fn frame_type(&self) -> FrameType {
        self.picture
            .as_ref()
            .map_or(FrameType::Unknown, |p| p.frame_type)
    }

    fn with_motion_side_data<R>(&self, visit: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let picture = self.picture.as_ref().filter(|p| p.has_side_data)?;
        let bytes: Vec<u8> = picture.motion.iter().flat_map(|mv| mv.encode()).collect();
        Some(visit(&bytes))
    }
}

impl Drop for ScriptedFrame {
    fn drop(&mut self) {
        self.probe.log_drop("frame");
    }
}

pub(crate) struct ScriptedConverter {
    width: u32,
    height: u32,
    stride: usize,
    buffer: Vec<u8>,
    probe: Rc<Probe>,
}

impl Converter for ScriptedConverter {
    type Frame = ScriptedFrame;

    fn convert(&mut self, frame: &ScriptedFrame) -> Result<Plane<'_>, BackendError> {
        let picture = frame
            .picture
            .as_ref()
            .ok_or_else(|| BackendError::new("convert", "frame holds no picture"))?;
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        for row in self.buffer.chunks_exact_mut(self.stride) {
            row[..row_bytes].fill(picture.fill);
        }
        debug_assert_eq!(self.buffer.len(), self.stride * self.height as usize);
        Ok(Plane {
            data: &self.buffer,
            stride: self.stride,
        })
    }
}

impl Drop for ScriptedConverter {
    fn drop(&mut self) {
        self.probe.log_drop("converter");
    }
}

impl Backend for ScriptedBackend {
    type Packet = ScriptedPacket;
    type Frame = ScriptedFrame;
    type Format = &'static str;
    type Input = ScriptedInput;
    type Decoder = ScriptedDecoder;
    type Converter = ScriptedConverter;

    fn open_input(&self, url: &str, options: &ProtocolOptions) -> Result<ScriptedInput, BackendError> {
        *self.probe.protocol_options.borrow_mut() = Some(options.clone());
        if self.script.fail_open {
            return Err(BackendError::new(
                "open input",
                format!("{url}: No such file or directory"),
            ));
        }
        Ok(ScriptedInput {
            format_name: self.script.format_name.clone(),
            stream: self.script.stream.clone(),
            steps: self.script.steps.iter().cloned().collect(),
            probe: Rc::clone(&self.probe),
        })
    }

    fn open_decoder(
        &self,
        _input: &ScriptedInput,
        _stream: &StreamInfo,
        settings: &DecoderSettings,
    ) -> Result<ScriptedDecoder, BackendError> {
        *self.probe.decoder_settings.borrow_mut() = Some(settings.clone());
        if self.script.fail_decoder {
            return Err(BackendError::new("open decoder", "Decoder not found"));
        }
        Ok(ScriptedDecoder {
            queue: VecDeque::new(),
            delay: self.script.decoder_delay,
            eof: false,
            probe: Rc::clone(&self.probe),
        })
    }

    fn new_converter(
        &self,
        key: &ConversionKey<&'static str>,
    ) -> Result<ScriptedConverter, BackendError> {
        self.probe
            .converters_built
            .set(self.probe.converters_built.get() + 1);
        let stride = key.width as usize * BYTES_PER_PIXEL + ROW_PADDING;
        Ok(ScriptedConverter {
            width: key.width,
            height: key.height,
            stride,
            buffer: vec![0; stride * key.height as usize],
            probe: Rc::clone(&self.probe),
        })
    }

    fn alloc_frame(&self) -> ScriptedFrame {
        ScriptedFrame {
            picture: None,
            probe: Rc::clone(&self.probe),
        }
    }
}

