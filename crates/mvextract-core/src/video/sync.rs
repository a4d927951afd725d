//! Mapping of RTP sample positions to sender wall-clock time.

use crate::ntp::NtpTimestamp;

/// The RTP timestamp <-> NTP time pair announced in an RTCP sender report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ntp_time: NtpTimestamp,
    pub rtp_timestamp: u32,
}

/// A packet's RTP timestamp together with the most recent sender report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    pub report: SenderReport,
    pub rtp_timestamp: u32,
}

impl SyncPoint {
    /// Sender wall-clock time of the packet in Unix seconds.
    ///
    /// `wallclock(report) + (rtp_timestamp - report.rtp_timestamp) / clock_rate`.
    /// The RTP difference is taken modulo 2^32 and read as signed, so packets
    /// sampled just before the report land slightly before it.
    pub fn frame_time(&self, clock_rate: u32) -> f64 {
        let report_time = self.report.ntp_time.to_wall_clock().as_secs_f64();
        let delta = self.rtp_timestamp.wrapping_sub(self.report.rtp_timestamp) as i32;
        report_time + delta as f64 / clock_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntp::{WallClock, NTP_UNIX_OFFSET};

    fn point(report_rtp: u32, rtp: u32) -> SyncPoint {
        SyncPoint {
            report: SenderReport {
                ntp_time: NtpTimestamp::from_wall_clock(WallClock::new(1_700_000_000, 250_000)),
                rtp_timestamp: report_rtp,
            },
            rtp_timestamp: rtp,
        }
    }

    #[test]
    fn same_sample_gives_report_time() {
        let t = point(1234, 1234).frame_time(90_000);
        assert!((t - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn one_second_of_samples_at_90khz() {
        let t = point(10_000, 100_000).frame_time(90_000);
        assert!((t - 1_700_000_001.25).abs() < 1e-6);
    }

    #[test]
    fn rtp_wraparound_counts_forward() {
        let t = point(u32::MAX - 44_999, 45_000).frame_time(90_000);
        assert!((t - 1_700_000_001.25).abs() < 1e-6, "got {t}");
    }

    #[test]
    fn samples_before_report_are_earlier() {
        let t = point(90_000, 45_000).frame_time(90_000);
        assert!((t - 1_699_999_999.75).abs() < 1e-6);
    }

    #[test]
    fn report_at_unix_epoch() {
        let sync = SyncPoint {
            report: SenderReport {
                ntp_time: NtpTimestamp::from_raw(NTP_UNIX_OFFSET << 32),
                rtp_timestamp: 0,
            },
            rtp_timestamp: 9_000,
        };
        assert!((sync.frame_time(90_000) - 0.1).abs() < 1e-9);
    }
}
