//! Feed reducer: decodes inbound messages into feed lines
//!
//! The reducer is the only writer of [`ViewState`]. It publishes every
//! mutation through a `watch` channel so any number of readers can render
//! snapshots without touching the reducer.

use tokio::sync::watch;
use tracing::{trace, warn};

use crate::state::ViewState;
use crate::types::{Channel, ConnectionStatus, LapEvent, PitEvent};
use crate::Result;

/// Reduces lap and pit messages into an append-only [`ViewState`]
pub struct FeedReducer {
    state: watch::Sender<ViewState>,
}

impl Default for FeedReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedReducer {
    /// Create a reducer with empty feeds.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ViewState::new());
        Self { state }
    }

    /// Subscribe to state changes.
    ///
    /// The receiver sees the current state immediately and is notified once
    /// per successful append or status change.
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Handle a body received on `/topic/lap`.
    ///
    /// Malformed bodies are logged and dropped; the feed is left untouched.
    pub fn on_lap_message(&self, raw: &str) -> Result<()> {
        let lap = LapEvent::decode(raw).inspect_err(|e| log_dropped(e, raw))?;
        self.append(Channel::Lap, lap.to_string());
        Ok(())
    }

    /// Handle a body received on `/topic/pit`.
    ///
    /// Malformed bodies are logged and dropped; the feed is left untouched.
    pub fn on_pit_message(&self, raw: &str) -> Result<()> {
        let pit = PitEvent::decode(raw).inspect_err(|e| log_dropped(e, raw))?;
        self.append(Channel::Pit, pit.to_string());
        Ok(())
    }

    /// Dispatch a body to the handler for `channel`.
    pub fn on_message(&self, channel: Channel, raw: &str) -> Result<()> {
        match channel {
            Channel::Lap => self.on_lap_message(raw),
            Channel::Pit => self.on_pit_message(raw),
        }
    }

    /// Update the connection indicator; readers are only notified on change.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.state.send_if_modified(|state| state.set_status(status));
    }

    fn append(&self, channel: Channel, line: String) {
        trace!("{} feed: {}", channel, line);
        self.state.send_modify(|state| state.append(channel, line));
    }
}

fn log_dropped(error: &crate::FeedError, raw: &str) {
    match std::error::Error::source(error) {
        Some(source) => warn!("Dropping message: {} ({}): {}", error, source, raw),
        None => warn!("Dropping message: {}: {}", error, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeedError;

    const MARC_LAP: &str = r#"{"rider":{"name":"Marc"},"lapNumber":3,"lapTimeMillis":98213}"#;
    const PECCO_PIT: &str =
        r#"{"rider":{"name":"Pecco"},"type":"tire change","waitTimeMillis":4200}"#;

    #[test]
    fn lap_message_appends_formatted_line() {
        let reducer = FeedReducer::new();
        reducer.on_lap_message(MARC_LAP).unwrap();

        let state = reducer.snapshot();
        assert_eq!(state.laps(), ["🏁 Marc completed lap 3 in 98213ms"]);
        assert!(state.pit_stops().is_empty());
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn pit_message_appends_formatted_line() {
        let reducer = FeedReducer::new();
        reducer.on_pit_message(PECCO_PIT).unwrap();

        let state = reducer.snapshot();
        assert_eq!(state.pit_stops(), ["🛠️ Pecco is in pit for tire change (wait: 4200ms)"]);
        assert!(state.laps().is_empty());
    }

    #[test]
    fn malformed_message_is_dropped_without_notification() {
        let reducer = FeedReducer::new();
        let mut rx = reducer.watch();
        rx.borrow_and_update();

        reducer.on_lap_message(MARC_LAP).unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        let err = reducer.on_lap_message(r#"{"rider":{},"lapNumber":4}"#).unwrap_err();
        assert!(matches!(err, FeedError::Decode { channel: Channel::Lap, .. }));
        assert!(reducer.on_pit_message("garbage").is_err());
        assert!(!rx.has_changed().unwrap());

        reducer.on_lap_message(&MARC_LAP.replace('3', "4")).unwrap();
        let state = reducer.snapshot();
        assert_eq!(state.laps().len(), 2);
        assert_eq!(state.laps()[1], "🏁 Marc completed lap 4 in 98214ms");
    }

    #[test]
    fn pit_body_on_lap_channel_is_rejected() {
        let reducer = FeedReducer::new();
        assert!(reducer.on_message(Channel::Lap, PECCO_PIT).is_err());
        assert!(reducer.on_message(Channel::Pit, MARC_LAP).is_err());
        assert_eq!(reducer.snapshot(), ViewState::new());
    }

    #[test]
    fn status_notifies_only_on_change() {
        let reducer = FeedReducer::new();
        let mut rx = reducer.watch();
        rx.borrow_and_update();

        reducer.set_status(ConnectionStatus::Connecting);
        assert!(!rx.has_changed().unwrap());

        reducer.set_status(ConnectionStatus::Live);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status(), &ConnectionStatus::Live);
        assert_eq!(reducer.snapshot().version(), 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn lap_body(name: &str, lap: u32, millis: u64) -> String {
            serde_json::json!({"rider": {"name": name}, "lapNumber": lap, "lapTimeMillis": millis})
                .to_string()
        }

        fn pit_body(name: &str, kind: &str, millis: u64) -> String {
            serde_json::json!({"rider": {"name": name}, "type": kind, "waitTimeMillis": millis})
                .to_string()
        }

        #[derive(Debug, Clone)]
        enum Inbound {
            Lap(String, u32, u64),
            Pit(String, String, u64),
            Garbage(Channel, String),
        }

        fn inbound() -> impl Strategy<Value = Inbound> {
            prop_oneof![
                ("[A-Za-z ]{1,12}", 1u32..30, 1u64..200_000)
                    .prop_map(|(n, l, m)| Inbound::Lap(n, l, m)),
                ("[A-Za-z ]{1,12}", "(Fuel|Tire|tire change)", 0u64..10_000)
                    .prop_map(|(n, k, m)| Inbound::Pit(n, k, m)),
                (prop_oneof![Just(Channel::Lap), Just(Channel::Pit)], "[^{}]{0,20}")
                    .prop_map(|(c, g)| Inbound::Garbage(c, g)),
            ]
        }

        proptest! {
          #[test]
          fn feeds_preserve_arrival_order(messages in prop::collection::vec(inbound(), 0..60)) {
            let reducer = FeedReducer::new();
            let mut expected_laps = Vec::new();
            let mut expected_pits = Vec::new();
            let mut previous = reducer.snapshot();

            for message in &messages {
              match message {
                Inbound::Lap(name, lap, millis) => {
                  reducer.on_lap_message(&lap_body(name, *lap, *millis)).unwrap();
                  expected_laps.push(format!("🏁 {name} completed lap {lap} in {millis}ms"));
                }
                Inbound::Pit(name, kind, millis) => {
                  reducer.on_pit_message(&pit_body(name, kind, *millis)).unwrap();
                  expected_pits.push(format!("🛠️ {name} is in pit for {kind} (wait: {millis}ms)"));
                }
                Inbound::Garbage(channel, body) => {
                  prop_assert!(reducer.on_message(*channel, body).is_err());
                }
              }

              // Appending is monotonic: earlier entries never change.
              let current = reducer.snapshot();
              prop_assert!(current.laps().starts_with(previous.laps()));
              prop_assert!(current.pit_stops().starts_with(previous.pit_stops()));
              previous = current;
            }

            let state = reducer.snapshot();
            prop_assert_eq!(state.laps(), expected_laps.as_slice());
            prop_assert_eq!(state.pit_stops(), expected_pits.as_slice());
            prop_assert_eq!(state.version() as usize, expected_laps.len() + expected_pits.len());
          }
        }
    }
}
