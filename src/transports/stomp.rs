//! STOMP over WebSocket transport

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::stomp::{Command, Frame, Version, parse_frames, parse_frames_as};
use crate::transport::{Session, Subscription, Transport};
use crate::{FeedError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<String>>>>;

/// Default bound on WebSocket connect plus STOMP handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long teardown waits for the broker to acknowledge DISCONNECT
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Versions offered in the CONNECT frame
const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

fn lock_routes(routes: &Routes) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<String>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport speaking STOMP over a WebSocket connection
#[derive(Debug, Clone)]
pub struct StompTransport {
    connect_timeout: Duration,
}

impl Default for StompTransport {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

impl StompTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the time spent on the WebSocket connect and STOMP handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Transport for StompTransport {
    type Session = StompSession;

    async fn connect(&self, endpoint: &str) -> Result<StompSession> {
        let duration = self.connect_timeout;
        tokio::time::timeout(duration, StompSession::open(endpoint))
            .await
            .map_err(|_| FeedError::Timeout { duration })?
    }
}

/// Established STOMP session
pub struct StompSession {
    sink: WsSink,
    routes: Routes,
    receipts: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
    subscriptions: Vec<String>,
    next_id: u32,
    closed: bool,
}

impl StompSession {
    async fn open(endpoint: &str) -> Result<Self> {
        info!("Connecting to STOMP endpoint {}", endpoint);
        if endpoint.starts_with("wss://") {
            install_crypto_provider();
        }

        let (ws, _response) = connect_async(endpoint).await.map_err(|e| {
            FeedError::connection_failed_with_source(
                format!("WebSocket connect to {endpoint} failed"),
                Box::new(e),
            )
        })?;
        let (mut sink, mut stream) = ws.split();

        let connect = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host_header(endpoint))
            .header("heart-beat", "0,0");
        send_frame(&mut sink, &connect).await?;

        let connected = await_connected(&mut stream).await?;
        let version = Version::negotiated(connected.get("version"));
        info!(
            "STOMP session established (version {}, server {})",
            version,
            connected.get("server").unwrap_or("unknown")
        );

        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (receipt_tx, receipt_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(reader_loop(stream, version, Arc::clone(&routes), receipt_tx));

        Ok(Self {
            sink,
            routes,
            receipts: receipt_rx,
            reader,
            subscriptions: Vec::new(),
            next_id: 0,
            closed: false,
        })
    }

    async fn await_receipt(&mut self, receipt: &str) -> bool {
        let wait = async {
            while let Some(id) = self.receipts.recv().await {
                if id == receipt {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(RECEIPT_TIMEOUT, wait).await.unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Session for StompSession {
    async fn subscribe(&mut self, destination: &str) -> Result<Subscription> {
        if self.closed {
            return Err(FeedError::subscription_failed(destination, "session is closed"));
        }

        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;

        // Route before SUBSCRIBE goes out so no MESSAGE can arrive unrouted.
        let (sender, receiver) = mpsc::unbounded_channel();
        lock_routes(&self.routes).insert(id.clone(), sender);

        let frame = Frame::new(Command::Subscribe)
            .header("id", id.as_str())
            .header("destination", destination)
            .header("ack", "auto");
        if let Err(e) = send_frame(&mut self.sink, &frame).await {
            lock_routes(&self.routes).remove(&id);
            return Err(FeedError::subscription_failed(destination, e.to_string()));
        }

        debug!("Subscribed {} to {}", id, destination);
        self.subscriptions.push(id.clone());
        Ok(Subscription::new(id, destination, receiver))
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        for id in std::mem::take(&mut self.subscriptions) {
            let frame = Frame::new(Command::Unsubscribe).header("id", id.as_str());
            if let Err(e) = send_frame(&mut self.sink, &frame).await {
                debug!("UNSUBSCRIBE {} not sent: {}", id, e);
            }
        }
        lock_routes(&self.routes).clear();

        let receipt = "disconnect-0";
        let disconnect = Frame::new(Command::Disconnect).header("receipt", receipt);
        match send_frame(&mut self.sink, &disconnect).await {
            Ok(()) => {
                if !self.await_receipt(receipt).await {
                    debug!("No RECEIPT for DISCONNECT, closing anyway");
                }
            }
            Err(e) => debug!("DISCONNECT not sent: {}", e),
        }

        if let Err(e) = self.sink.close().await {
            debug!("WebSocket close failed: {}", e);
        }
        self.reader.abort();
        info!("STOMP session closed");
        Ok(())
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Install ring as the process TLS provider unless one is already set.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        trace!("Installed ring TLS provider");
    }
}

/// Host header value: the endpoint's host, falling back to localhost.
fn host_header(endpoint: &str) -> String {
    endpoint
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

async fn send_frame(sink: &mut WsSink, frame: &Frame) -> Result<()> {
    trace!(">>> {}", frame.command);
    sink.send(Message::Text(frame.encode().into())).await.map_err(|e| {
        FeedError::connection_failed_with_source(
            format!("failed to send {} frame", frame.command),
            Box::new(e),
        )
    })
}

/// Text carried by a WebSocket message, or `None` for control messages.
fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!("Discarding non UTF-8 binary WebSocket message");
                None
            }
        },
        _ => None,
    }
}

async fn await_connected(stream: &mut SplitStream<WsStream>) -> Result<Frame> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| {
            FeedError::connection_failed_with_source(
                "WebSocket failed during handshake",
                Box::new(e),
            )
        })?;
        if let Message::Close(close) = &message {
            return Err(FeedError::connection_failed(format!(
                "WebSocket closed during handshake: {close:?}"
            )));
        }
        let Some(text) = message_text(message) else {
            continue;
        };

        for frame in parse_frames(&text)? {
            match frame.command {
                Command::Connected => return Ok(frame),
                Command::Error => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str());
                    return Err(FeedError::handshake_rejected(reason.to_string()));
                }
                other => trace!("Ignoring {} frame before CONNECTED", other),
            }
        }
    }

    Err(FeedError::connection_failed("WebSocket ended before CONNECTED"))
}

/// Routes MESSAGE bodies to subscriptions until the socket closes.
///
/// Dropping the routes on exit ends every subscription.
async fn reader_loop(
    mut stream: SplitStream<WsStream>,
    version: Version,
    routes: Routes,
    receipts: mpsc::UnboundedSender<String>,
) {
    debug!("STOMP reader started");

    'socket: while let Some(message) = stream.next().await {
        let message = match message {
            Ok(Message::Close(close)) => {
                info!("Broker closed WebSocket: {:?}", close);
                break;
            }
            Ok(message) => message,
            Err(e) => {
                warn!("WebSocket read failed: {}", e);
                break;
            }
        };
        let Some(text) = message_text(message) else {
            continue;
        };

        let frames = match parse_frames_as(&text, version) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Discarding malformed STOMP message: {}", e);
                continue;
            }
        };

        for frame in frames {
            trace!("<<< {}", frame.command);
            match frame.command {
                Command::Message => {
                    let Some(id) = frame.get("subscription").map(str::to_owned) else {
                        warn!("MESSAGE without subscription header dropped");
                        continue;
                    };
                    match lock_routes(&routes).get(&id) {
                        Some(sender) => {
                            if sender.send(frame.body).is_err() {
                                trace!("Subscription {} no longer listening", id);
                            }
                        }
                        None => trace!("MESSAGE for unknown subscription {}", id),
                    }
                }
                Command::Receipt => {
                    if let Some(id) = frame.get("receipt-id") {
                        let _ = receipts.send(id.to_string());
                    }
                }
                Command::Error => {
                    error!(
                        "Broker sent ERROR: {} {}",
                        frame.get("message").unwrap_or(""),
                        frame.body.trim()
                    );
                    break 'socket;
                }
                other => trace!("Ignoring {} frame", other),
            }
        }
    }

    lock_routes(&routes).clear();
    debug!("STOMP reader ended");
}
