//! Capture session: opens an input, owns its native resources and tears them
//! down again.

use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;

use super::backend::{
    Backend, ConversionKey, Decoder, DecoderSettings, Demuxer, Geometry, ProtocolOptions,
    StreamInfo,
};
use super::sync::SyncPoint;

/// Decodes frames and motion vectors from an H.264 file or RTSP stream.
///
/// Usage mirrors a classic video capture object: [`open`](Self::open) an
/// input, then either call [`read`](Self::read) in a loop or split it into
/// [`grab`](Self::grab) (fast: demux and decode) and
/// [`retrieve`](Self::retrieve) (slower: color conversion and motion-vector
/// extraction). Grabbing several cameras first and retrieving afterwards keeps
/// their timestamps close together.
///
/// Calls are blocking and a session must not be shared between threads; run
/// one session per stream instead.
pub struct VideoCap<B: Backend> {
    pub(super) backend: B,
    pub(super) config: CaptureConfig,
    pub(super) session: Option<OpenSession<B>>,
}

/// State of an open input. Only exists when a video stream was selected and
/// its decoder opened.
pub(super) struct OpenSession<B: Backend> {
    pub(super) url: String,
    pub(super) live: bool,
    pub(super) stream: StreamInfo,
    pub(super) options: ProtocolOptions,
    pub(super) input: B::Input,
    pub(super) decoder: B::Decoder,
    /// Most recently decoded frame, overwritten by every `grab`.
    pub(super) frame: B::Frame,
    pub(super) decoded: bool,
    pub(super) converter: Option<CachedConverter<B>>,
    pub(super) frame_number: u64,
    pub(super) frame_timestamp: f64,
    /// End of input was signalled to the decoder.
    pub(super) draining: bool,
    /// Sync point of the last video packet fed to the decoder.
    pub(super) pending_sync: Option<SyncPoint>,
}

pub(super) struct CachedConverter<B: Backend> {
    pub(super) key: ConversionKey<B::Format>,
    pub(super) display: (u32, u32),
    pub(super) converter: B::Converter,
}

impl<B: Backend> VideoCap<B> {
    pub fn new(backend: B, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            session: None,
        }
    }

    pub fn with_backend(backend: B) -> Self {
        Self::new(backend, CaptureConfig::default())
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// True if the open input is a live stream whose frames are timestamped
    /// from sender reports.
    pub fn is_live(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.live)
    }

    pub fn url(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.url.as_str())
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.session.as_ref().map(|s| &s.stream)
    }

    /// Number of frames grabbed since the input was opened.
    pub fn frame_number(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frame_number)
    }

    /// Open a video file or stream URL, releasing any input opened before.
    ///
    /// On failure nothing stays open.
    pub fn open(&mut self, url: &str) -> Result<(), CaptureError> {
        self.release();

        match self.open_session(url) {
            Ok(session) => {
                info!(
                    url,
                    live = session.live,
                    stream_index = session.stream.index,
                    codec = %session.stream.codec_name,
                    width = session.stream.width,
                    height = session.stream.height,
                    declared_frames = ?session.stream.frame_count,
                    "capture opened"
                );
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!(url, error = %e, "failed to open capture");
                Err(e)
            }
        }
    }

    /// Resources acquired here are dropped in reverse order on every early
    /// return.
    fn open_session(&self, url: &str) -> Result<OpenSession<B>, CaptureError> {
        let options = ProtocolOptions {
            transport: self.config.transport,
            connect_timeout: self.config.connect_timeout,
        };
        let open_error = |source| CaptureError::Open {
            url: url.to_string(),
            source,
        };

        let input = self.backend.open_input(url, &options).map_err(open_error)?;

        let format_name = input.format_name();
        let live = is_live_protocol(&format_name, &self.config.live_marker);
        debug!(url, format_name, live, "input probed");

        let stream = input
            .best_video_stream()
            .ok_or_else(|| CaptureError::NoVideoStream {
                url: url.to_string(),
            })?;

        let settings = DecoderSettings {
            thread_count: self.config.resolved_thread_count(),
            export_motion_vectors: true,
        };
        debug!(
            threads = settings.thread_count,
            codec = %stream.codec_name,
            "opening decoder"
        );
        let decoder = self
            .backend
            .open_decoder(&input, &stream, &settings)
            .map_err(open_error)?;

        let geometry = decoder.geometry();
        if (geometry.width == 0 && stream.width != 0) || (geometry.height == 0 && stream.height != 0)
        {
            warn!(
                decoder_width = geometry.width,
                decoder_height = geometry.height,
                declared_width = stream.width,
                declared_height = stream.height,
                "decoder cleared picture size, using encoder-declared size"
            );
        }

        let frame = self.backend.alloc_frame();

        Ok(OpenSession {
            url: url.to_string(),
            live,
            stream,
            options,
            input,
            decoder,
            frame,
            decoded: false,
            converter: None,
            frame_number: 0,
            frame_timestamp: 0.0,
            draining: false,
            pending_sync: None,
        })
    }

    /// Free all native resources and return to the closed state.
    ///
    /// Safe to call at any time, any number of times.
    pub fn release(&mut self) {
        match self.session.take() {
            Some(session) => session.close(),
            None => debug!("release on closed capture"),
        }
    }
}

impl<B: Backend> Drop for VideoCap<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: Backend> OpenSession<B> {
    /// Tear down in dependency order: converter, frame, decoder, demuxer,
    /// protocol options.
    fn close(self) {
        let OpenSession {
            url,
            options,
            input,
            decoder,
            frame,
            converter,
            frame_number,
            ..
        } = self;

        drop(converter);
        drop(frame);
        drop(decoder);
        drop(input);
        drop(options);

        info!(url = %url, frames = frame_number, "capture released");
    }

    /// Display size of the current picture. Dimensions the decoder reports as
    /// zero fall back to the encoder-declared ones.
    pub(super) fn display_size(&self, geometry: Geometry) -> (u32, u32) {
        let width = if geometry.width == 0 {
            self.stream.width
        } else {
            geometry.width
        };
        let height = if geometry.height == 0 {
            self.stream.height
        } else {
            geometry.height
        };
        (width, height)
    }
}

/// True if any entry of the comma-separated `format_names` equals `marker`.
pub fn is_live_protocol(format_names: &str, marker: &str) -> bool {
    !marker.is_empty() && format_names.split(',').any(|name| name == marker)
}
