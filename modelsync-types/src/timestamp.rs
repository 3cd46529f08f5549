//! Wall-clock timestamps for watermarks and record change markers.
//!
//! The backend reports `_lastChangedAt` as milliseconds since the Unix epoch
//! and filters `updatedAt` with ISO-8601 date-times, so [`Timestamp`] stores
//! the former and renders the latter.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Error;

/// Milliseconds since the Unix epoch.
///
/// `Timestamp::ZERO` doubles as "never synced": a zero watermark forces a
/// full fetch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch itself.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Returns the current wall-clock time.
    ///
    /// A system clock set before the epoch yields [`Timestamp::ZERO`].
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from epoch seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Returns epoch milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// True for the "never synced" value.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[must_use]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Adds a duration, saturating at the maximum representable value.
    #[must_use]
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Subtracts a duration, saturating at the epoch.
    #[must_use]
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Renders the timestamp as an ISO-8601 UTC date-time
    /// (`2024-03-01T12:00:00.000Z`), the format `updatedAt` filters expect.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        let millis = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parses an ISO-8601 date-time with offset.
    pub fn parse_rfc3339(value: &str) -> crate::Result<Self> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|e| Error::InvalidTimestamp(format!("{value}: {e}")))?;
        let millis = parsed.timestamp_millis();
        if millis < 0 {
            return Err(Error::InvalidTimestamp(format!(
                "{value}: before the Unix epoch"
            )));
        }
        Ok(Self(millis as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}
