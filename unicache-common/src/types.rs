//! # Command Argument Types
//!
//! Small value types shared by the command contract: TTL replies, expiry
//! arguments, and write conditions. Durations are always carried as
//! `std::time::Duration` so no caller ever passes a bare integer whose unit
//! has to be guessed.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, CacheResult};

/// TTL state returned by the server, mirroring Redis semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

impl Ttl {
    /// Maps a PTTL reply (milliseconds, or -1/-2) to a `Ttl`.
    pub fn from_pttl(value: i64) -> Self {
        match value {
            -2 => Ttl::Missing,
            v if v < 0 => Ttl::NoExpiry,
            v => Ttl::ExpiresIn(Duration::from_millis(v as u64)),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Ttl::ExpiresIn(left) => Some(*left),
            _ => None,
        }
    }
}

/// A validated, non-zero expiry expressed in the coarsest exact unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Whole seconds (EX / EXPIRE).
    Seconds(u64),
    /// Milliseconds (PX / PEXPIRE), rounded up from sub-millisecond input.
    Millis(u64),
}

impl Expiry {
    /// Converts a duration without silent truncation.
    ///
    /// Whole-second durations use seconds; anything with a fractional part is
    /// sent in milliseconds, rounded up. A zero duration is rejected because
    /// the server refuses a zero expiry.
    pub fn from_duration(ttl: Duration) -> CacheResult<Self> {
        if ttl.is_zero() {
            return Err(CacheError::illegal_argument("expiry must be greater than zero"));
        }
        if ttl.subsec_nanos() == 0 {
            return Ok(Expiry::Seconds(ttl.as_secs()));
        }
        let millis = ttl.as_nanos().div_ceil(1_000_000);
        Ok(Expiry::Millis(u64::try_from(millis).unwrap_or(u64::MAX)))
    }

    /// Option token for SET (`EX` or `PX`) and its numeric argument.
    pub fn set_option(&self) -> (&'static [u8], u64) {
        match *self {
            Expiry::Seconds(secs) => (b"EX", secs),
            Expiry::Millis(millis) => (b"PX", millis),
        }
    }

    /// Milliseconds represented by this expiry.
    pub fn as_millis(&self) -> u64 {
        match *self {
            Expiry::Seconds(secs) => secs.saturating_mul(1_000),
            Expiry::Millis(millis) => millis,
        }
    }
}

/// Converts an absolute deadline to Unix milliseconds for PEXPIREAT.
///
/// Deadlines before the epoch are clamped to zero, which expires the key.
pub fn unix_millis(deadline: SystemTime) -> u64 {
    deadline
        .duration_since(UNIX_EPOCH)
        .map(|since| u64::try_from(since.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Write condition for SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Unconditional write.
    #[default]
    Always,
    /// NX: write only if the key does not exist.
    IfAbsent,
    /// XX: write only if the key already exists.
    IfPresent,
}

impl SetCondition {
    pub fn token(&self) -> Option<&'static [u8]> {
        match self {
            SetCondition::Always => None,
            SetCondition::IfAbsent => Some(b"NX"),
            SetCondition::IfPresent => Some(b"XX"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_seconds_use_ex() {
        let expiry = Expiry::from_duration(Duration::from_secs(30)).unwrap();
        assert_eq!(expiry, Expiry::Seconds(30));
        assert_eq!(expiry.set_option(), (&b"EX"[..], 30));
    }

    #[test]
    fn fractional_durations_use_px_rounded_up() {
        let expiry = Expiry::from_duration(Duration::from_millis(1500)).unwrap();
        assert_eq!(expiry, Expiry::Millis(1500));

        let expiry = Expiry::from_duration(Duration::from_micros(1)).unwrap();
        assert_eq!(expiry, Expiry::Millis(1));
    }

    #[test]
    fn zero_expiry_is_rejected() {
        let err = Expiry::from_duration(Duration::ZERO).unwrap_err();
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn pttl_mapping() {
        assert_eq!(Ttl::from_pttl(-2), Ttl::Missing);
        assert_eq!(Ttl::from_pttl(-1), Ttl::NoExpiry);
        assert_eq!(
            Ttl::from_pttl(2500),
            Ttl::ExpiresIn(Duration::from_millis(2500))
        );
    }

    #[test]
    fn pre_epoch_deadline_clamps_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(unix_millis(before), 0);
        assert_eq!(unix_millis(UNIX_EPOCH + Duration::from_secs(2)), 2_000);
    }
}
