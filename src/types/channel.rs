//! Feed channels and their wire destinations

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two publish/subscribe channels the race server broadcasts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Lap completions
    Lap,
    /// Pit-stop entries
    Pit,
}

impl Channel {
    /// Both channels, in the order they are subscribed.
    pub const ALL: [Channel; 2] = [Channel::Lap, Channel::Pit];

    /// Broker destination this channel is published on.
    ///
    /// These names are a wire-level convention shared with the publisher and
    /// must match exactly.
    pub fn destination(self) -> &'static str {
        match self {
            Channel::Lap => "/topic/lap",
            Channel::Pit => "/topic/pit",
        }
    }

    /// Section heading used when rendering this channel's feed.
    pub fn label(self) -> &'static str {
        match self {
            Channel::Lap => "Laps",
            Channel::Pit => "Pit Stops",
        }
    }

    /// Resolve a broker destination back to its channel.
    pub fn from_destination(destination: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.destination() == destination)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Lap => f.write_str("lap"),
            Channel::Pit => f.write_str("pit"),
        }
    }
}
