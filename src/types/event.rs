//! Typed lap and pit-stop events decoded from message bodies

use std::fmt;

use serde::Deserialize;

use crate::types::Channel;
use crate::{FeedError, Result};

/// The rider an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rider {
    pub name: String,
}

/// A completed lap, as published on `/topic/lap`.
///
/// All fields are required; unknown fields in the payload are ignored.
/// Numbers are taken as published, sign included.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapEvent {
    pub rider: Rider,
    pub lap_number: i64,
    pub lap_time_millis: i64,
}

/// A rider entering the pit lane, as published on `/topic/pit`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitEvent {
    pub rider: Rider,
    #[serde(rename = "type")]
    pub kind: String,
    pub wait_time_millis: i64,
}

impl LapEvent {
    /// Decode a lap event from a raw JSON message body.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|source| FeedError::Decode { channel: Channel::Lap, source })
    }
}

impl PitEvent {
    /// Decode a pit event from a raw JSON message body.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|source| FeedError::Decode { channel: Channel::Pit, source })
    }
}

impl fmt::Display for LapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🏁 {} completed lap {} in {}ms",
            self.rider.name, self.lap_number, self.lap_time_millis
        )
    }
}

impl fmt::Display for PitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🛠️ {} is in pit for {} (wait: {}ms)",
            self.rider.name, self.kind, self.wait_time_millis
        )
    }
}
