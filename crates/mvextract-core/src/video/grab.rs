//! Demux and decode the next frame.

use tracing::{debug, info, trace, warn};

use crate::error::CaptureError;
use crate::ntp::WallClock;

use super::backend::{Backend, Decoder, DemuxedPacket, Demuxer, ReadOutcome};
use super::capture::{OpenSession, VideoCap};

impl<B: Backend> VideoCap<B> {
    /// Read packets until the decoder yields the next video frame.
    ///
    /// Every packet of another stream, every read failure and every decode
    /// attempt that produces no frame counts as one non-productive attempt;
    /// more than `max_attempts` of them fail the call. Reads that report
    /// "try again" are retried without counting. Frames still buffered in the
    /// decoder are drained after the end of input.
    pub fn grab(&mut self) -> Result<(), CaptureError> {
        let max_attempts = self.config.max_attempts;
        let clock_rate = self.config.rtp_clock_rate;
        let session = self.session.as_mut().ok_or(CaptureError::NotOpen)?;

        session.decoded = false;

        if let Some(total) = session.stream.frame_count {
            if session.frame_number >= total {
                debug!(frames = session.frame_number, total, "declared frame count reached");
                return Err(CaptureError::EndOfStream {
                    frames: session.frame_number,
                });
            }
        }

        // a previous packet may have produced more than one frame
        if !session.draining && session.receive() {
            session.complete_frame(clock_rate);
            return Ok(());
        }

        let mut attempts = 0u32;
        let mut count_attempt = |reason: &'static str| {
            attempts += 1;
            trace!(attempts, reason, "non-productive attempt");
            if attempts > max_attempts {
                warn!(attempts, max_attempts, "giving up on grab");
                Err(CaptureError::RetryLimit { attempts })
            } else {
                Ok(())
            }
        };

        loop {
            if session.draining {
                if session.receive() {
                    session.complete_frame(clock_rate);
                    return Ok(());
                }
                count_attempt("drained")?;
                continue;
            }

            match session.input.read_packet() {
                ReadOutcome::Again => continue,
                ReadOutcome::EndOfStream => {
                    info!(
                        url = %session.url,
                        frames = session.frame_number,
                        "end of input, draining decoder"
                    );
                    if let Err(e) = session.decoder.send_eof() {
                        warn!(error = %e, "failed to signal end of input to decoder");
                    }
                    session.draining = true;
                    session.pending_sync = None;
                }
                ReadOutcome::Failed(e) => {
                    debug!(error = %e, "packet read failed");
                    count_attempt("read failed")?;
                }
                ReadOutcome::Packet(packet) if packet.stream_index() != session.stream.index => {
                    count_attempt("other stream")?;
                }
                ReadOutcome::Packet(packet) => {
                    session.pending_sync = packet.sync_point();
                    if let Err(e) = session.decoder.send_packet(&packet) {
                        debug!(error = %e, "decoder rejected packet");
                    }
                    if session.receive() {
                        session.complete_frame(clock_rate);
                        return Ok(());
                    }
                    count_attempt("no frame decoded")?;
                }
            }
        }
    }
}

impl<B: Backend> OpenSession<B> {
    /// Pull one decoded frame into `self.frame`.
    fn receive(&mut self) -> bool {
        match self.decoder.receive_frame(&mut self.frame) {
            Ok(received) => received,
            Err(e) => {
                debug!(error = %e, "decoder returned no frame");
                false
            }
        }
    }

    fn complete_frame(&mut self, clock_rate: u32) {
        let sync = self.pending_sync.filter(|_| self.live);
        self.frame_timestamp = match sync {
            Some(sync) => sync.frame_time(clock_rate),
            None => WallClock::now().as_secs_f64(),
        };
        self.frame_number += 1;
        self.decoded = true;
        debug!(
            frame_number = self.frame_number,
            timestamp = self.frame_timestamp,
            synced = sync.is_some(),
            "grabbed frame"
        );
    }
}
