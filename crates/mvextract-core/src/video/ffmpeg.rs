//! Backend on top of the FFmpeg libraries (libavformat, libavcodec, libswscale).

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{packet, threading};
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::{codec, format, frame, media, picture, Dictionary, Packet};
use tracing::{debug, info};

use crate::error::BackendError;
use crate::ntp::{NtpTimestamp, WallClock};

use super::backend::{
    Backend, ConversionKey, Converter, Decoder, DecoderSettings, DemuxedPacket, Demuxer, Geometry,
    ProtocolOptions, RawFrame, ReadOutcome, StreamInfo,
};
use super::frame::{FrameType, Plane};
use super::sync::{SenderReport, SyncPoint};

/// Entry point to the FFmpeg libraries. Creating one initializes them.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend(());

impl FfmpegBackend {
    pub fn new() -> Result<Self, BackendError> {
        ffmpeg::init().map_err(|e| BackendError::new("initialize ffmpeg", e))?;
        info!(version = ffmpeg::util::version(), "ffmpeg initialized");
        Ok(Self(()))
    }
}

pub struct FfmpegInput {
    context: format::context::Input,
}

pub struct FfmpegPacket {
    packet: Packet,
}

impl DemuxedPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.packet.stream()
    }

    /// The RTP demuxer attaches a producer reference time to every packet
    /// once an RTCP sender report has arrived. Its wall clock is already
    /// projected onto the packet's RTP timestamp.
    fn sync_point(&self) -> Option<SyncPoint> {
        let prft = self
            .packet
            .side_data()
            .find(|side| side.kind() == packet::side_data::Type::PRFT)?;
        let wallclock: [u8; 8] = prft.data().get(..8)?.try_into().ok()?;
        let wallclock = i64::from_ne_bytes(wallclock);
        let rtp_timestamp = self.packet.pts().unwrap_or(0) as u32;

        Some(SyncPoint {
            report: SenderReport {
                ntp_time: NtpTimestamp::from_wall_clock(WallClock::from_unix_micros(wallclock)),
                rtp_timestamp,
            },
            rtp_timestamp,
        })
    }
}

impl Demuxer for FfmpegInput {
    type Packet = FfmpegPacket;

    fn format_name(&self) -> String {
        self.context.format().name().to_string()
    }

    fn best_video_stream(&self) -> Option<StreamInfo> {
        let stream = self.context.streams().best(media::Type::Video)?;
        let parameters = stream.parameters();
        // SAFETY: the parameters belong to a stream of the open input.
        let (width, height) = unsafe {
            let raw = parameters.as_ptr();
            ((*raw).width, (*raw).height)
        };
        let frames = stream.frames();

        Some(StreamInfo {
            index: stream.index(),
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            frame_count: (frames > 0).then_some(frames as u64),
            codec_name: parameters.id().name().to_string(),
        })
    }

    fn read_packet(&mut self) -> ReadOutcome<FfmpegPacket> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.context) {
            Ok(()) => ReadOutcome::Packet(FfmpegPacket { packet }),
            Err(ffmpeg::Error::Eof) => ReadOutcome::EndOfStream,
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                ReadOutcome::Again
            }
            Err(e) => ReadOutcome::Failed(BackendError::new("read packet", e)),
        }
    }
}

pub struct FfmpegFrame {
    frame: frame::Video,
}

impl RawFrame for FfmpegFrame {
    fn is_populated(&self) -> bool {
        !self.frame.is_empty()
    }

    fn frame_type(&self) -> FrameType {
        match self.frame.kind() {
            picture::Type::I => FrameType::I,
            picture::Type::P => FrameType::P,
            picture::Type::B => FrameType::B,
            picture::Type::S => FrameType::S,
            picture::Type::SI => FrameType::Si,
            picture::Type::SP => FrameType::Sp,
            picture::Type::BI => FrameType::Bi,
            picture::Type::None => FrameType::Unknown,
        }
    }

    fn with_motion_side_data<R>(&self, visit: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.frame
            .side_data(frame::side_data::Type::MotionVectors)
            .map(|side| visit(side.data()))
    }
}

pub struct FfmpegDecoder {
    decoder: codec::decoder::Video,
}

fn is_again(error: &ffmpeg::Error) -> bool {
    matches!(error, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

impl Decoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;
    type Format = Pixel;

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<(), BackendError> {
        self.decoder
            .send_packet(&packet.packet)
            .map_err(|e| BackendError::new("send packet", e))
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.decoder
            .send_eof()
            .map_err(|e| BackendError::new("send eof", e))
    }

    fn receive_frame(&mut self, frame: &mut FfmpegFrame) -> Result<bool, BackendError> {
        match self.decoder.receive_frame(&mut frame.frame) {
            Ok(()) => Ok(true),
            Err(ffmpeg::Error::Eof) => Ok(false),
            Err(e) if is_again(&e) => Ok(false),
            Err(e) => Err(BackendError::new("receive frame", e)),
        }
    }

    fn geometry(&self) -> Geometry {
        // SAFETY: the codec context stays valid while the decoder is open.
        let (coded_width, coded_height) = unsafe {
            let raw = self.decoder.as_ptr();
            ((*raw).coded_width, (*raw).coded_height)
        };
        Geometry {
            width: self.decoder.width(),
            height: self.decoder.height(),
            coded_width: coded_width.max(0) as u32,
            coded_height: coded_height.max(0) as u32,
        }
    }

    fn pixel_format(&self) -> Pixel {
        self.decoder.format()
    }
}

/// Converts whole coded pictures to packed RGB24.
pub struct FfmpegConverter {
    scaler: scaling::Context,
    output: frame::Video,
    height: u32,
}

impl Converter for FfmpegConverter {
    type Frame = FfmpegFrame;

    fn convert(&mut self, frame: &FfmpegFrame) -> Result<Plane<'_>, BackendError> {
        // The scaler's safe entry point insists on the frame's display size;
        // the context was built for the coded size, so call libswscale directly.
        // SAFETY: both frames hold allocated planes for at least `self.height`
        // rows in the formats the scaler was created with.
        let rows = unsafe {
            let source = frame.frame.as_ptr();
            let target = self.output.as_mut_ptr();
            ffmpeg::ffi::sws_scale(
                self.scaler.as_mut_ptr(),
                (*source).data.as_ptr() as *const *const u8,
                (*source).linesize.as_ptr(),
                0,
                self.height as i32,
                (*target).data.as_ptr(),
                (*target).linesize.as_ptr(),
            )
        };
        if rows < 0 {
            return Err(BackendError::new("convert", ffmpeg::Error::from(rows)));
        }

        Ok(Plane {
            data: self.output.data(0),
            stride: self.output.stride(0),
        })
    }
}

impl Backend for FfmpegBackend {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;
    type Format = Pixel;
    type Input = FfmpegInput;
    type Decoder = FfmpegDecoder;
    type Converter = FfmpegConverter;

    fn open_input(&self, url: &str, options: &ProtocolOptions) -> Result<FfmpegInput, BackendError> {
        let mut dictionary = Dictionary::new();
        dictionary.set("rtsp_transport", options.transport.as_str());
        dictionary.set("timeout", &options.connect_timeout.as_micros().to_string());

        let context = format::input_with_dictionary(&url, dictionary)
            .map_err(|e| BackendError::new("open input", e))?;
        debug!(url, format = context.format().name(), "input opened");
        Ok(FfmpegInput { context })
    }

    fn open_decoder(
        &self,
        input: &FfmpegInput,
        stream: &StreamInfo,
        settings: &DecoderSettings,
    ) -> Result<FfmpegDecoder, BackendError> {
        let parameters = input
            .context
            .stream(stream.index)
            .ok_or_else(|| BackendError::new("open decoder", "stream vanished from input"))?
            .parameters();
        let mut context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| BackendError::new("load decoder parameters", e))?;
        context.set_threading(threading::Config {
            kind: threading::Type::Frame,
            count: settings.thread_count,
            ..Default::default()
        });

        let codec = codec::decoder::find(context.id()).ok_or_else(|| {
            BackendError::new("open decoder", format!("no decoder for {}", stream.codec_name))
        })?;

        let mut options = Dictionary::new();
        if settings.export_motion_vectors {
            options.set("flags2", "+export_mvs");
        }

        let decoder = context
            .decoder()
            .open_as_with(codec, options)
            .and_then(|opened| opened.video())
            .map_err(|e| BackendError::new("open decoder", e))?;
        Ok(FfmpegDecoder { decoder })
    }

    fn new_converter(&self, key: &ConversionKey<Pixel>) -> Result<FfmpegConverter, BackendError> {
        let scaler = scaling::Context::get(
            key.source_format,
            key.width,
            key.height,
            Pixel::RGB24,
            key.width,
            key.height,
            scaling::Flags::BICUBIC,
        )
        .map_err(|e| BackendError::new("create scaler", e))?;

        Ok(FfmpegConverter {
            scaler,
            output: frame::Video::new(Pixel::RGB24, key.width, key.height),
            height: key.height,
        })
    }

    fn alloc_frame(&self) -> FfmpegFrame {
        FfmpegFrame {
            frame: frame::Video::empty(),
        }
    }
}
