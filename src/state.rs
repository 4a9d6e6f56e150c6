//! View state shared between the reducer and the view

use serde::Serialize;

use crate::types::{Channel, ConnectionStatus};

/// The two feeds plus the connection indicator.
///
/// Both feeds are append-only and keep arrival order. Every mutation bumps
/// `version`, so readers can tell snapshots apart without comparing lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    laps: Vec<String>,
    pit_stops: Vec<String>,
    status: ConnectionStatus,
    version: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lap lines, oldest first
    pub fn laps(&self) -> &[String] {
        &self.laps
    }

    /// Pit-stop lines, oldest first
    pub fn pit_stops(&self) -> &[String] {
        &self.pit_stops
    }

    /// Lines of one channel's feed
    pub fn feed(&self, channel: Channel) -> &[String] {
        match channel {
            Channel::Lap => &self.laps,
            Channel::Pit => &self.pit_stops,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Number of mutations applied since the state was created
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn append(&mut self, channel: Channel, line: String) {
        match channel {
            Channel::Lap => self.laps.push(line),
            Channel::Pit => self.pit_stops.push(line),
        }
        self.version += 1;
    }

    /// Returns whether the status changed.
    pub(crate) fn set_status(&mut self, status: ConnectionStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.version += 1;
        true
    }
}
