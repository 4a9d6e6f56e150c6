//! In-process transport backed by a shared broker
//!
//! Useful for tests, benchmarks and offline demos: a [`MemoryBroker`] plays
//! the publishing side and hands out [`MemoryTransport`]s for feeds to
//! connect through.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::transport::{Session, Subscription, Transport};
use crate::{FeedError, Result};

struct Subscriber {
    session: u64,
    id: String,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<String, Vec<Subscriber>>,
    refuse_reason: Option<String>,
    rejected_destinations: HashSet<String>,
    endpoints: Vec<String>,
    next_session: u64,
    teardowns: usize,
}

/// Shared in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transport that connects feeds to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { broker: self.clone() }
    }

    /// Deliver `body` to every live subscription on `destination`.
    ///
    /// Returns the number of subscriptions the body was delivered to.
    pub fn publish(&self, destination: &str, body: impl Into<String>) -> usize {
        let body = body.into();
        let mut state = self.lock();
        let Some(subscribers) = state.subscribers.get_mut(destination) else {
            return 0;
        };

        subscribers.retain(|subscriber| subscriber.sender.send(body.clone()).is_ok());
        trace!("Published to {} ({} subscribers)", destination, subscribers.len());
        subscribers.len()
    }

    /// Number of live subscriptions on `destination`.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.lock()
            .subscribers
            .get(destination)
            .map(|subscribers| subscribers.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Make every subsequent `connect` fail with `reason`.
    pub fn refuse_connections(&self, reason: impl Into<String>) {
        self.lock().refuse_reason = Some(reason.into());
    }

    /// Make every subsequent subscription to `destination` fail.
    pub fn reject_destination(&self, destination: impl Into<String>) {
        self.lock().rejected_destinations.insert(destination.into());
    }

    /// Endpoints that sessions were opened against, in connection order.
    pub fn connected_endpoints(&self) -> Vec<String> {
        self.lock().endpoints.clone()
    }

    /// Number of sessions that have been torn down.
    pub fn teardown_count(&self) -> usize {
        self.lock().teardowns
    }
}

/// Transport connecting to a [`MemoryBroker`]
#[derive(Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    type Session = MemorySession;

    async fn connect(&self, endpoint: &str) -> Result<MemorySession> {
        let mut state = self.broker.lock();
        if let Some(reason) = &state.refuse_reason {
            return Err(FeedError::connection_failed(reason.clone()));
        }

        state.next_session += 1;
        state.endpoints.push(endpoint.to_string());
        let id = state.next_session;
        debug!("Memory session {} opened for {}", id, endpoint);

        Ok(MemorySession { broker: self.broker.clone(), id, next_subscription: 0, closed: false })
    }
}

/// Session on a [`MemoryBroker`]
pub struct MemorySession {
    broker: MemoryBroker,
    id: u64,
    next_subscription: u32,
    closed: bool,
}

#[async_trait::async_trait]
impl Session for MemorySession {
    async fn subscribe(&mut self, destination: &str) -> Result<Subscription> {
        if self.closed {
            return Err(FeedError::subscription_failed(destination, "session is closed"));
        }

        let mut state = self.broker.lock();
        if state.rejected_destinations.contains(destination) {
            return Err(FeedError::subscription_failed(destination, "rejected by broker"));
        }

        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.entry(destination.to_string()).or_default().push(Subscriber {
            session: self.id,
            id: id.clone(),
            sender,
        });
        debug!("Memory session {} subscribed {} to {}", self.id, id, destination);

        Ok(Subscription::new(id, destination, receiver))
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut state = self.broker.lock();
        for subscribers in state.subscribers.values_mut() {
            subscribers.retain(|subscriber| {
                let keep = subscriber.session != self.id;
                if !keep {
                    trace!("Dropping subscription {}", subscriber.id);
                }
                keep
            });
        }
        state.teardowns += 1;
        debug!("Memory session {} torn down", self.id);
        Ok(())
    }
}
