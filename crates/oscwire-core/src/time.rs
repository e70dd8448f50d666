//! OSC time tags
//!
//! A time tag is a 64-bit NTP timestamp: the high 32 bits count whole
//! seconds since 1900-01-01 and the low 32 bits are a binary fraction of a
//! second. The value `1` (0 seconds, fraction 1) is reserved and means
//! "immediately".

use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const FRACTION_SCALE: f64 = 4_294_967_296.0; // 2^32

/// NTP64 time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeTag {
    // Field order gives the derived Ord the same result as comparing the raw u64.
    seconds: u32,
    fraction: u32,
}

impl TimeTag {
    /// The reserved "immediately" tag
    pub const IMMEDIATE: TimeTag = TimeTag {
        seconds: 0,
        fraction: 1,
    };

    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    pub const fn from_ntp(ntp: u64) -> Self {
        Self {
            seconds: (ntp >> 32) as u32,
            fraction: ntp as u32,
        }
    }

    pub const fn immediate() -> Self {
        Self::IMMEDIATE
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a wall-clock time. Times outside the NTP era 0 range wrap.
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_unix = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d,
            Err(_) => Duration::ZERO,
        };
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        let fraction = (since_unix.subsec_nanos() as f64 / 1e9 * FRACTION_SCALE) as u32;
        Self { seconds, fraction }
    }

    pub fn to_system_time(&self) -> SystemTime {
        let secs = self.seconds as u64;
        let nanos = self.subsec_nanos();
        if secs >= NTP_UNIX_OFFSET {
            UNIX_EPOCH + Duration::new(secs - NTP_UNIX_OFFSET, nanos)
        } else {
            UNIX_EPOCH - (Duration::from_secs(NTP_UNIX_OFFSET - secs) - Duration::from_nanos(nanos as u64))
        }
    }

    pub const fn to_ntp(&self) -> u64 {
        ((self.seconds as u64) << 32) | self.fraction as u64
    }

    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    pub const fn fraction(&self) -> u32 {
        self.fraction
    }

    pub const fn is_immediate(&self) -> bool {
        self.seconds == 0 && self.fraction == 1
    }

    /// Whether this tag names a time strictly after `now`. The immediate tag
    /// is never in the future.
    pub fn is_future(&self, now: TimeTag) -> bool {
        !self.is_immediate() && *self > now
    }

    /// Time elapsed from `earlier` to `self`, or `None` if `earlier` is later
    pub fn duration_since(&self, earlier: TimeTag) -> Option<Duration> {
        let diff = self.to_ntp().checked_sub(earlier.to_ntp())?;
        Some(ntp_to_duration(diff))
    }

    pub fn checked_add(&self, duration: Duration) -> Option<TimeTag> {
        self.to_ntp()
            .checked_add(duration_to_ntp(duration))
            .map(TimeTag::from_ntp)
    }

    fn subsec_nanos(&self) -> u32 {
        ((self.fraction as f64 / FRACTION_SCALE) * 1e9) as u32
    }
}

impl Default for TimeTag {
    fn default() -> Self {
        Self::IMMEDIATE
    }
}

impl From<u64> for TimeTag {
    fn from(ntp: u64) -> Self {
        TimeTag::from_ntp(ntp)
    }
}

impl From<TimeTag> for u64 {
    fn from(tag: TimeTag) -> Self {
        tag.to_ntp()
    }
}

impl From<SystemTime> for TimeTag {
    fn from(time: SystemTime) -> Self {
        TimeTag::from_system_time(time)
    }
}

/// Saturates at the largest representable tag
impl Add<Duration> for TimeTag {
    type Output = TimeTag;

    fn add(self, rhs: Duration) -> TimeTag {
        self.checked_add(rhs)
            .unwrap_or(TimeTag::from_ntp(u64::MAX))
    }
}

impl std::fmt::Display for TimeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_immediate() {
            write!(f, "immediate")
        } else {
            write!(f, "{}.{:08x}", self.seconds, self.fraction)
        }
    }
}

fn ntp_to_duration(ntp: u64) -> Duration {
    let secs = ntp >> 32;
    let nanos = ((ntp & 0xFFFF_FFFF) as f64 / FRACTION_SCALE * 1e9) as u32;
    Duration::new(secs, nanos.min(999_999_999))
}

fn duration_to_ntp(d: Duration) -> u64 {
    let secs = d.as_secs().min(u32::MAX as u64);
    let frac = (d.subsec_nanos() as f64 / 1e9 * FRACTION_SCALE) as u64;
    (secs << 32) | frac.min(0xFFFF_FFFF)
}

/// Source of "now" for due-time comparisons
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeTag;
}

/// Wall-clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeTag {
        TimeTag::now()
    }
}
