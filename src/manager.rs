//! Connection manager: owns the session lifecycle behind a live feed

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::FeedConfig;
use crate::reducer::FeedReducer;
use crate::state::ViewState;
use crate::transport::{Session, Subscription, Transport};
use crate::types::{Channel, ConnectionStatus};

/// Spawns and manages the task feeding a [`FeedReducer`] from a session
///
/// The task connects once, subscribes to both channels, and hands every
/// inbound body to the reducer in delivery order. Both subscriptions are
/// polled from one loop, so handlers never run concurrently.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Activate a feed over `transport`.
    ///
    /// Returns immediately; connection progress is reported through
    /// [`LiveFeed::status`]. Must be called from within a Tokio runtime.
    pub fn activate<T>(transport: T, config: &FeedConfig) -> LiveFeed
    where
        T: Transport,
    {
        let reducer = FeedReducer::new();
        let state = reducer.watch();
        let cancel = CancellationToken::new();

        let endpoint = config.endpoint.clone();
        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move {
            Self::session_task(transport, endpoint, reducer, cancel_task).await;
        });

        LiveFeed { state, cancel, task: Some(task) }
    }

    async fn session_task<T>(
        transport: T,
        endpoint: String,
        reducer: FeedReducer,
        cancel: CancellationToken,
    ) where
        T: Transport,
    {
        info!("Activating race feed on {}", endpoint);
        reducer.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Feed deactivated before the session was established");
                reducer.set_status(ConnectionStatus::Disconnected);
                return;
            }
            result = transport.connect(&endpoint) => result,
        };

        let mut session = match connected {
            Ok(session) => session,
            Err(e) => {
                error!("Connection to {} failed: {}", endpoint, e);
                reducer.set_status(ConnectionStatus::Failed { reason: e.to_string() });
                return;
            }
        };

        let mut laps = Self::subscribe(&mut session, Channel::Lap).await;
        let mut pits = Self::subscribe(&mut session, Channel::Pit).await;

        if laps.is_none() && pits.is_none() {
            error!("No channel could be subscribed, closing session");
            Self::teardown(&mut session).await;
            reducer.set_status(ConnectionStatus::Failed {
                reason: "no channel could be subscribed".to_string(),
            });
            return;
        }
        reducer.set_status(Self::status_for(laps.is_some(), pits.is_some()));

        let mut delivered = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Feed deactivated");
                    break;
                }
                body = next_body(&mut laps), if laps.is_some() => match body {
                    Some(body) => {
                        delivered += 1;
                        let _ = reducer.on_lap_message(&body);
                    }
                    None => {
                        warn!("{} feed closed by transport", Channel::Lap);
                        laps = None;
                    }
                },
                body = next_body(&mut pits), if pits.is_some() => match body {
                    Some(body) => {
                        delivered += 1;
                        let _ = reducer.on_pit_message(&body);
                    }
                    None => {
                        warn!("{} feed closed by transport", Channel::Pit);
                        pits = None;
                    }
                },
            }

            if laps.is_none() && pits.is_none() {
                info!("Both feeds closed by transport");
                break;
            }
            reducer.set_status(Self::status_for(laps.is_some(), pits.is_some()));
        }

        for subscription in [laps.as_mut(), pits.as_mut()].into_iter().flatten() {
            subscription.close();
        }
        Self::teardown(&mut session).await;
        reducer.set_status(ConnectionStatus::Disconnected);

        info!("Feed task ended (delivered {} messages)", delivered);
    }

    /// Subscribe one channel; a failure only disables that channel.
    async fn subscribe<S: Session>(session: &mut S, channel: Channel) -> Option<Subscription> {
        match session.subscribe(channel.destination()).await {
            Ok(subscription) => {
                debug!("Subscribed to {} as {}", subscription.destination(), subscription.id());
                Some(subscription)
            }
            Err(e) => {
                error!("{} feed unavailable: {}", channel, e);
                None
            }
        }
    }

    async fn teardown<S: Session>(session: &mut S) {
        if let Err(e) = session.teardown().await {
            warn!("Session teardown failed: {}", e);
        }
    }

    fn status_for(laps_live: bool, pits_live: bool) -> ConnectionStatus {
        match (laps_live, pits_live) {
            (true, true) => ConnectionStatus::Live,
            (true, false) => ConnectionStatus::Degraded { unavailable: Channel::Pit },
            (false, true) => ConnectionStatus::Degraded { unavailable: Channel::Lap },
            (false, false) => ConnectionStatus::Disconnected,
        }
    }
}

async fn next_body(subscription: &mut Option<Subscription>) -> Option<String> {
    match subscription {
        Some(subscription) => subscription.next_message().await,
        None => std::future::pending().await,
    }
}

/// Handle to an active feed
///
/// Dropping the handle deactivates the feed; use [`LiveFeed::deactivate`] to
/// also wait for the session to be torn down.
pub struct LiveFeed {
    state: watch::Receiver<ViewState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Clone of the current view state
    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status().clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Stream of snapshots: the current state first, then one per change.
    ///
    /// Ends once the feed task has finished and the last state was yielded.
    pub fn updates(&self) -> impl Stream<Item = ViewState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Wait until `predicate` holds for the state.
    ///
    /// Returns `None` if the feed task ends without the predicate holding.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<ViewState>
    where
        F: FnMut(&ViewState) -> bool,
    {
        let mut state = self.state.clone();
        let matched = state.wait_for(|s| predicate(s)).await.ok().map(|s| s.clone());
        matched
    }

    /// Whether the feed task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the feed and wait for the session to be torn down.
    ///
    /// Once this returns, neither feed will grow.
    pub async fn deactivate(mut self) -> ViewState {
        debug!("Deactivating live feed");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Feed task failed: {}", e);
            }
        }
        trace!("Live feed deactivated");
        self.state()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        debug!("Dropping live feed");
        self.cancel.cancel();
    }
}
