use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default bound on consecutive non-productive packet reads in `grab`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 512;

/// RTP reference clock for video payloads.
pub const DEFAULT_RTP_CLOCK_RATE: u32 = 90_000;

/// Format name libavformat reports for RTSP inputs.
pub const DEFAULT_LIVE_MARKER: &str = "rtsp";

/// Lower transport used for RTSP sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtspTransport {
    #[default]
    Tcp,
    Udp,
    UdpMulticast,
    Http,
}

impl RtspTransport {
    /// Value of the `rtsp_transport` protocol option.
    pub fn as_str(self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
            RtspTransport::UdpMulticast => "udp_multicast",
            RtspTransport::Http => "http",
        }
    }
}

impl fmt::Display for RtspTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RtspTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(RtspTransport::Tcp),
            "udp" => Ok(RtspTransport::Udp),
            "udp_multicast" => Ok(RtspTransport::UdpMulticast),
            "http" => Ok(RtspTransport::Http),
            other => Err(format!(
                "unknown RTSP transport '{other}', expected tcp, udp, udp_multicast or http"
            )),
        }
    }
}

/// Parameters for a capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Transport requested for network inputs.
    pub transport: RtspTransport,
    /// Upper bound on connecting to and reading from a network input.
    pub connect_timeout: Duration,
    /// `grab` fails once this many consecutive reads yield no frame.
    pub max_attempts: u32,
    /// Clock rate of the RTP timestamps, in Hz.
    pub rtp_clock_rate: u32,
    /// Demuxer format name that marks an input as a live stream.
    pub live_marker: String,
    /// Decoder worker threads, or None for one per available CPU core.
    pub thread_count: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            transport: RtspTransport::Tcp,
            connect_timeout: Duration::from_secs(5),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rtp_clock_rate: DEFAULT_RTP_CLOCK_RATE,
            live_marker: DEFAULT_LIVE_MARKER.to_string(),
            thread_count: None,
        }
    }
}

impl CaptureConfig {
    /// Decoder thread count, resolving `None` to the number of CPU cores.
    pub fn resolved_thread_count(&self) -> usize {
        self.thread_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_force_tcp_with_bounded_timeout() {
        let config = CaptureConfig::default();
        assert_eq!(config.transport, RtspTransport::Tcp);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 512);
        assert_eq!(config.rtp_clock_rate, 90_000);
        assert_eq!(config.live_marker, "rtsp");
    }

    #[test]
    fn transport_parses_case_insensitively() {
        assert_eq!("UDP".parse::<RtspTransport>(), Ok(RtspTransport::Udp));
        assert_eq!("udp_multicast".parse::<RtspTransport>(), Ok(RtspTransport::UdpMulticast));
        assert!("quic".parse::<RtspTransport>().is_err());
    }

    #[test]
    fn thread_count_resolves_to_at_least_one() {
        let config = CaptureConfig::default();
        assert!(config.resolved_thread_count() >= 1);

        let pinned = CaptureConfig {
            thread_count: Some(3),
            ..CaptureConfig::default()
        };
        assert_eq!(pinned.resolved_thread_count(), 3);
    }
}
