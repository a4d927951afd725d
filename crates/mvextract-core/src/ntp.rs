//! Conversion between 64-bit NTP timestamps and Unix wall-clock time.
//!
//! An NTP timestamp is 32 bits of integer seconds since 1900-01-01 followed by
//! 32 bits of binary fraction of a second. On the wire it is big-endian; in
//! memory it is handled as a plain `u64` with the seconds in the high half.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const MICROS_PER_SECOND: u64 = 1_000_000;
const FRACTION_MASK: u64 = 0xFFFF_FFFF;

/// Unix time split into whole seconds and microseconds, like a C `timeval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WallClock {
    pub seconds: i64,
    pub micros: u32,
}

impl WallClock {
    pub fn new(seconds: i64, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Current local wall-clock time.
    pub fn now() -> Self {
        let micros = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_micros() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_micros() as i64),
        };
        Self::from_unix_micros(micros)
    }

    /// Build from a signed count of microseconds since the Unix epoch.
    pub fn from_unix_micros(micros: i64) -> Self {
        Self {
            seconds: micros.div_euclid(MICROS_PER_SECOND as i64),
            micros: micros.rem_euclid(MICROS_PER_SECOND as i64) as u32,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.micros as f64 / MICROS_PER_SECOND as f64
    }
}

/// Renders `seconds.micros` with the microseconds zero-padded to 6 digits.
impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}

/// A raw 64-bit NTP timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Parse the 8-byte network (big-endian) representation.
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Integer seconds since the NTP epoch.
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fraction of a second in units of 2^-32 s.
    pub const fn fraction(self) -> u32 {
        (self.0 & FRACTION_MASK) as u32
    }

    pub fn to_wall_clock(self) -> WallClock {
        ntp_to_wall_clock(self.0)
    }

    pub fn from_wall_clock(wall: WallClock) -> Self {
        Self(wall_clock_to_ntp(wall))
    }
}

/// Renders the integer and fraction halves as 8 hex digits each, dot separated.
impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}.{:08x}", self.seconds(), self.fraction())
    }
}

/// Map a raw NTP timestamp to Unix seconds and microseconds.
///
/// `micros = floor(fraction * 10^6 / 2^32)`. Seconds before the Unix epoch come
/// out negative.
pub fn ntp_to_wall_clock(raw: u64) -> WallClock {
    let seconds = (raw >> 32) as i64 - NTP_UNIX_OFFSET as i64;
    let micros = ((raw & FRACTION_MASK) * MICROS_PER_SECOND) >> 32;
    WallClock {
        seconds,
        micros: micros as u32,
    }
}

/// Map Unix seconds and microseconds to a raw NTP timestamp.
///
/// `fraction = floor(micros * 2^32 / 10^6)`; the seconds are re-biased by
/// [`NTP_UNIX_OFFSET`] and truncated to 32 bits.
pub fn wall_clock_to_ntp(wall: WallClock) -> u64 {
    let seconds = wall.seconds.wrapping_add(NTP_UNIX_OFFSET as i64) as u64 & FRACTION_MASK;
    let fraction = ((wall.micros as u64) << 32) / MICROS_PER_SECOND & FRACTION_MASK;
    (seconds << 32) | fraction
}
