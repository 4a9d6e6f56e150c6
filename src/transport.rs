//! Transport traits for publish/subscribe sessions

use tokio::sync::mpsc;

use crate::Result;

/// Factory for messaging sessions
///
/// Transports abstract over how a session is reached (STOMP over WebSocket,
/// in-process broker, ...). Reconnection policy, if any, belongs to the
/// transport; the feed only ever calls `connect` once per activation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Session type produced by this transport
    type Session: Session;

    /// Open a connection to `endpoint` and complete the session handshake.
    async fn connect(&self, endpoint: &str) -> Result<Self::Session>;
}

/// An established messaging session capable of hosting subscriptions
#[async_trait::async_trait]
pub trait Session: Send + 'static {
    /// Register a subscription on `destination`.
    ///
    /// Returns:
    /// - `Ok(subscription)` - Message bodies will be delivered in arrival order
    /// - `Err(e)` - The destination could not be subscribed; other
    ///   subscriptions on the same session are unaffected
    async fn subscribe(&mut self, destination: &str) -> Result<Subscription>;

    /// Close every subscription and the underlying connection.
    ///
    /// After teardown no further bodies are delivered on any subscription.
    async fn teardown(&mut self) -> Result<()>;
}

/// Inbound message bodies for one destination
#[derive(Debug)]
pub struct Subscription {
    id: String,
    destination: String,
    messages: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    /// Create a subscription backed by `messages`.
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        messages: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { id: id.into(), destination: destination.into(), messages }
    }

    /// Transport-assigned subscription id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Destination this subscription listens on
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Wait for the next message body.
    ///
    /// Returns `None` once the transport has closed this subscription.
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Stop accepting deliveries; buffered bodies are discarded.
    pub fn close(&mut self) {
        self.messages.close();
        while self.messages.try_recv().is_ok() {}
    }
}
