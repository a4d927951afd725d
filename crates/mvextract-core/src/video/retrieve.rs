use tracing::debug;

use crate::error::CaptureError;

use super::backend::{Backend, ConversionKey, Converter, Decoder, RawFrame};
use super::capture::{CachedConverter, VideoCap};
use super::frame::{FrameView, Retrieved};
use super::motion;

impl<B: Backend> VideoCap<B> {
    /// Convert the last grabbed frame to RGB24 and extract its motion vectors.
    ///
    /// The conversion context is cached and rebuilt only when the source
    /// format, coded size or display size changes.
    pub fn retrieve(&mut self) -> Result<Retrieved<'_>, CaptureError> {
        let VideoCap {
            backend, session, ..
        } = self;
        let session = session.as_mut().ok_or(CaptureError::NotOpen)?;

        if !session.decoded || !session.frame.is_populated() {
            return Err(CaptureError::NoFrame);
        }

        let geometry = session.decoder.geometry();
        let (width, height) = session.display_size(geometry);
        let key = ConversionKey {
            source_format: session.decoder.pixel_format(),
            width: geometry.coded_width.max(width),
            height: geometry.coded_height.max(height),
        };

        let stale = session
            .converter
            .as_ref()
            .map_or(true, |cached| cached.key != key || cached.display != (width, height));
        if stale {
            // free the old context before building its replacement
            session.converter = None;
            debug!(
                format = ?key.source_format,
                coded_width = key.width,
                coded_height = key.height,
                width,
                height,
                "building conversion context"
            );
            let converter = backend
                .new_converter(&key)
                .map_err(CaptureError::Conversion)?;
            session.converter = Some(CachedConverter {
                key,
                display: (width, height),
                converter,
            });
        }

        let cached = session.converter.as_mut().ok_or(CaptureError::NoFrame)?;
        let plane = cached
            .converter
            .convert(&session.frame)
            .map_err(CaptureError::Conversion)?;
        let frame = FrameView::new(plane, width, height).ok_or(CaptureError::ShortBuffer {
            width,
            height,
            expected: super::frame::required_len(plane.stride, width, height),
            actual: plane.data.len(),
        })?;

        let motion_vectors = session
            .frame
            .with_motion_side_data(motion::from_side_data)
            .transpose()?
            .unwrap_or_default();

        Ok(Retrieved {
            frame,
            motion_vectors,
            frame_type: session.frame.frame_type(),
            timestamp: session.frame_timestamp,
        })
    }

    /// [`grab`](Self::grab) followed by [`retrieve`](Self::retrieve).
    pub fn read(&mut self) -> Result<Retrieved<'_>, CaptureError> {
        self.grab()?;
        self.retrieve()
    }
}
