//! Core types for the race feed.
//!
//! - [`Channel`] names the two broker destinations and their display labels
//! - [`LapEvent`] and [`PitEvent`] are the decoded message payloads; their
//!   `Display` impls produce the feed lines
//! - [`ConnectionStatus`] is the connection-state indicator shown with the feeds
//!
//! ## Usage Example
//!
//! ```rust
//! use racefeed::types::LapEvent;
//!
//! let lap = LapEvent::decode(r#"{"rider":{"name":"Marc"},"lapNumber":3,"lapTimeMillis":98213}"#)
//!     .unwrap();
//! assert_eq!(lap.to_string(), "🏁 Marc completed lap 3 in 98213ms");
//! ```

mod channel;
mod event;
mod status;

pub use channel::Channel;
pub use event::{LapEvent, PitEvent, Rider};
pub use status::ConnectionStatus;
