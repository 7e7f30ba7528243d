//! Block-aware time.
//!
//! Commands execute inside a block, so every point in time the command layer
//! deals with carries both the block's wall-clock time and its height.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

pub use std::time::Duration as WallDuration;

/// A point in time as observed by the host state machine: the wall time of a
/// block and its height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Block time.
    pub wall: DateTime<Utc>,
    /// Block height.
    pub height: u64,
}

impl Timestamp {
    /// Creates a new timestamp.
    pub fn new(wall: DateTime<Utc>, height: u64) -> Self {
        Self { wall, height }
    }

    /// Returns `true` if this timestamp plus `validity` lies strictly before
    /// `now`.
    ///
    /// A wall-time validity that overflows the calendar never expires.
    pub fn expired_at(&self, validity: &Duration, now: &Timestamp) -> bool {
        match validity {
            Duration::BlockCount(blocks) => match self.height.checked_add(*blocks) {
                Some(deadline) => deadline < now.height,
                None => false,
            },
            Duration::Wall(duration) => chrono::Duration::from_std(*duration)
                .ok()
                .and_then(|delta| self.wall.checked_add_signed(delta))
                .is_some_and(|deadline| deadline < now.wall),
        }
    }

    /// Orders two timestamps by block height, the host's ordering unit.
    pub fn cmp_height(&self, other: &Timestamp) -> Ordering {
        self.height.cmp(&other.height)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.wall.to_rfc3339(), self.height)
    }
}

/// A validity window, measured either in blocks or in wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Duration {
    /// A number of blocks.
    BlockCount(u64),
    /// A wall-clock duration.
    #[serde(with = "wall_seconds")]
    Wall(WallDuration),
}

impl Duration {
    /// Returns `true` for a zero-length window.
    pub fn is_zero(&self) -> bool {
        match self {
            Duration::BlockCount(blocks) => *blocks == 0,
            Duration::Wall(duration) => duration.is_zero(),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duration::BlockCount(blocks) => write!(f, "{blocks} blocks"),
            Duration::Wall(duration) => write!(f, "{}s", duration.as_secs()),
        }
    }
}

/// Wall durations are written as whole seconds so that they read naturally in
/// TOML and JSON parameter files.
mod wall_seconds {
    use super::WallDuration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &WallDuration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WallDuration, D::Error> {
        Ok(WallDuration::from_secs(u64::deserialize(deserializer)?))
    }
}
