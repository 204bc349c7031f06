use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, SystemTime},
};

/// An exact time and date used to represent absolute timelocks and invoice
/// creation dates, in seconds since epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    // This will work for the next 80 years
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        Timestamp(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("SystemTime::duration_since failed")
                .as_secs() as u32,
        )
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u32) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    pub fn add_relative(self, relative: RelativeTime) -> Self {
        self.plus(relative.0)
    }

    /// The time left from `self` until `later`, `None` if `later` is not
    /// after `self`.
    pub fn duration_until(self, later: Timestamp) -> Option<Duration> {
        match later.0.checked_sub(self.0) {
            Some(0) | None => None,
            Some(seconds) => Some(Duration::from_secs(u64::from(seconds))),
        }
    }

    /// Seconds from `self` until `later`, zero if `later` has passed.
    pub fn seconds_until(self, later: Timestamp) -> u32 {
        later.0.saturating_sub(self.0)
    }
}

/// The u32 input is the number of seconds since epoch
impl From<u32> for Timestamp {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

/// The u32 returned is the number of seconds since epoch
impl From<Timestamp> for u32 {
    fn from(item: Timestamp) -> Self {
        item.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A duration in seconds used to represent a relative timelock
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RelativeTime(u32);

impl RelativeTime {
    pub const fn new(time_secs: u32) -> Self {
        RelativeTime(time_secs)
    }

    pub const fn as_secs(self) -> u32 {
        self.0
    }

    pub fn saturating_add(self, other: RelativeTime) -> Self {
        RelativeTime(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul(self, factor: u32) -> Self {
        RelativeTime(self.0.saturating_mul(factor))
    }
}

/// The u32 returned is the duration in seconds
impl From<RelativeTime> for u32 {
    fn from(item: RelativeTime) -> Self {
        item.0
    }
}

/// The u32 input is the duration in seconds
impl From<u32> for RelativeTime {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

impl From<RelativeTime> for Duration {
    fn from(item: RelativeTime) -> Self {
        Duration::from_secs(u64::from(item.0))
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
