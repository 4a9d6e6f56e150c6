//! Connection state surfaced alongside the feeds

use serde::Serialize;

use crate::types::Channel;

/// Lifecycle state of the session behind a live feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Connecting or waiting for the session handshake
    #[default]
    Connecting,

    /// Both channels subscribed and delivering
    Live,

    /// Session is up but one channel's feed is unavailable
    Degraded { unavailable: Channel },

    /// Session closed, either by deactivation or by the broker
    Disconnected,

    /// Session could not be established, or no channel could be subscribed
    Failed { reason: String },
}

impl ConnectionStatus {
    /// Whether messages may still arrive in this state.
    pub fn is_receiving(&self) -> bool {
        matches!(self, ConnectionStatus::Live | ConnectionStatus::Degraded { .. })
    }
}
