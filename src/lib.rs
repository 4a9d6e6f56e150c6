//! Live race feed client for lap and pit-stop telemetry.
//!
//! racefeed subscribes to the two topics a race server publishes on
//! (`/topic/lap`, `/topic/pit`), decodes each JSON message into a typed event,
//! and appends a human-readable line to one of two ordered, append-only feeds.
//!
//! # Architecture
//!
//! - **Connection manager** ([`ConnectionManager`]): opens one session over a
//!   [`Transport`], subscribes both channels, tears down on deactivation
//! - **Feed reducer** ([`FeedReducer`]): decodes bodies and appends feed lines,
//!   dropping malformed messages
//! - **View** ([`view`]): renders a [`ViewState`] snapshot as text
//!
//! ## Example (in-process broker)
//!
//! ```rust
//! use racefeed::{FeedConfig, RaceFeed, transports::MemoryBroker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> racefeed::Result<()> {
//!     let broker = MemoryBroker::new();
//!     let feed = RaceFeed::with_transport(broker.transport(), FeedConfig::default())?;
//!     feed.wait_for(|state| state.status().is_receiving()).await;
//!
//!     broker.publish("/topic/lap", r#"{"rider":{"name":"Marc"},"lapNumber":3,"lapTimeMillis":98213}"#);
//!     let state = feed.wait_for(|state| !state.laps().is_empty()).await.unwrap();
//!     assert_eq!(state.laps()[0], "🏁 Marc completed lap 3 in 98213ms");
//!
//!     feed.deactivate().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod state;
pub mod types;

// Feed pipeline
pub mod manager;
pub mod reducer;
pub mod stream;
pub mod view;

// Transports and wire protocol
pub mod stomp;
pub mod transport;
pub mod transports;

// Core exports
pub use config::FeedConfig;
pub use error::*;
pub use state::ViewState;
pub use types::{Channel, ConnectionStatus, LapEvent, PitEvent, Rider};

// Main API exports
pub use manager::{ConnectionManager, LiveFeed};
pub use reducer::FeedReducer;
pub use transport::{Session, Subscription, Transport};

/// Entry point for live race feeds.
pub struct RaceFeed;

impl RaceFeed {
    /// Connect to the race server's STOMP endpoint.
    ///
    /// Validates `config` and activates a feed in the background; connection
    /// progress and failures are reported through [`LiveFeed::status`].
    ///
    /// # Errors
    ///
    /// Returns a [`FeedError::Config`] if the endpoint is invalid.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use racefeed::{FeedConfig, RaceFeed};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> racefeed::Result<()> {
    /// let feed = RaceFeed::connect(FeedConfig::default().with_env_override()?)?;
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "stomp")]
    pub fn connect(config: FeedConfig) -> Result<LiveFeed> {
        Self::with_transport(transports::StompTransport::new(), config)
    }

    /// Activate a feed over any transport.
    pub fn with_transport<T: Transport>(transport: T, config: FeedConfig) -> Result<LiveFeed> {
        config.validate()?;
        Ok(ConnectionManager::activate(transport, &config))
    }
}
