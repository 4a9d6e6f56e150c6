//! Error types for the live race feed.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context for logging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the transport could not reach the broker
//! - **Handshake Errors**: the broker rejected the session
//! - **Decode Errors**: a message body was not a valid lap or pit event
//! - **Subscription Errors**: a single channel could not be registered
//! - **Protocol Errors**: a malformed STOMP frame arrived on the wire
//! - **Config Errors**: the endpoint configuration is missing or invalid
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use racefeed::FeedError;
//!
//! let error = FeedError::connection_failed("broker not reachable");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Channel;

/// Result type alias for feed operations.
pub type Result<T, E = FeedError> = std::result::Result<T, E>;

/// Main error type for feed operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FeedError {
    #[error("Failed to connect to race feed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Session handshake rejected: {reason}")]
    Handshake { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Malformed {channel} message")]
    Decode {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("Subscription to '{destination}' failed: {reason}")]
    Subscription { destination: String, reason: String },

    #[error("STOMP protocol error: {details}")]
    Protocol { details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FeedError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Connection { .. } => true,
            FeedError::Handshake { .. } => true,
            FeedError::Timeout { .. } => true,
            FeedError::Subscription { .. } => true,
            FeedError::Decode { .. } => false,
            FeedError::Protocol { .. } => false,
            FeedError::Config { .. } => false,
            FeedError::ConfigFile { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            FeedError::Connection { .. } => vec![
                "Ensure the race server is running",
                "Check the configured endpoint URL",
                "Verify the WebSocket port is reachable",
            ],
            FeedError::Handshake { .. } => vec![
                "Check the broker accepts STOMP 1.0-1.2 clients",
                "Verify the endpoint path points at the STOMP endpoint",
            ],
            FeedError::Timeout { .. } => vec![
                "Check network latency to the race server",
                "Verify the server is not overloaded",
            ],
            FeedError::Decode { .. } => vec![
                "Check the publisher sends rider.name and numeric fields",
                "Verify publisher and client agree on the payload format",
            ],
            FeedError::Subscription { .. } => vec![
                "Check the destination name matches the publisher",
                "Reconnect to re-register the subscription",
            ],
            FeedError::Protocol { .. } => vec![
                "Verify the endpoint speaks STOMP over WebSocket",
                "Check for proxies rewriting WebSocket frames",
            ],
            FeedError::Config { .. } => vec![
                "Set 'endpoint' to a ws:// or wss:// URL",
                "Remove unrecognized configuration keys",
            ],
            FeedError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        FeedError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        FeedError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for handshake rejections.
    pub fn handshake_rejected(reason: impl Into<String>) -> Self {
        FeedError::Handshake { reason: reason.into() }
    }

    /// Helper constructor for per-channel subscription failures.
    pub fn subscription_failed(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        FeedError::Subscription { destination: destination.into(), reason: reason.into() }
    }

    /// Helper constructor for wire protocol errors.
    pub fn protocol(details: impl Into<String>) -> Self {
        FeedError::Protocol { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        FeedError::Config { reason: reason.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn config_file(path: PathBuf, source: std::io::Error) -> Self {
        FeedError::ConfigFile { path, source }
    }
}
