//! STOMP transport against an in-test WebSocket broker

#![cfg(feature = "stomp")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use racefeed::stomp::{Command, Frame, parse_frames};
use racefeed::transports::StompTransport;
use racefeed::{ConnectionStatus, FeedConfig, FeedError, RaceFeed, Transport};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(5);

const LAP_MARC: &str = r#"{"rider":{"name":"Marc"},"lapNumber":3,"lapTimeMillis":98213}"#;
const LAP_PECCO: &str = r#"{"rider":{"name":"Pecco"},"lapNumber":3,"lapTimeMillis":99001}"#;
const PIT_PECCO: &str = r#"{"rider":{"name":"Pecco"},"type":"tire change","waitTimeMillis":4200}"#;
const PIT_JORGE: &str = r#"{"rider":{"name":"Jorge"},"type":"Fuel","waitTimeMillis":0}"#;

type ServerSocket = WebSocketStream<TcpStream>;

async fn next_frame(ws: &mut ServerSocket) -> Option<Frame> {
    while let Some(message) = ws.next().await {
        let Ok(Message::Text(text)) = message else {
            continue;
        };
        let mut frames = parse_frames(text.as_str()).expect("client sent a valid frame");
        if !frames.is_empty() {
            return Some(frames.remove(0));
        }
    }
    None
}

async fn send(ws: &mut ServerSocket, frame: Frame) {
    ws.send(Message::Text(frame.encode().into())).await.expect("broker send");
}

/// Bind a broker and run `script` against the first client that connects.
async fn broker<F, Fut, T>(script: F) -> (SocketAddr, JoinHandle<T>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await
    });
    (addr, handle)
}

/// Answer CONNECT and collect the two SUBSCRIBE frames (destination -> id).
async fn handshake(ws: &mut ServerSocket) -> (Frame, HashMap<String, String>) {
    let connect = next_frame(ws).await.expect("CONNECT");
    let connected =
        Frame::new(Command::Connected).header("version", "1.2").header("server", "test");
    send(ws, connected).await;

    let mut subscriptions = HashMap::new();
    while subscriptions.len() < 2 {
        let frame = next_frame(ws).await.expect("SUBSCRIBE");
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.get("ack"), Some("auto"));
        subscriptions.insert(
            frame.get("destination").unwrap().to_string(),
            frame.get("id").unwrap().to_string(),
        );
    }
    (connect, subscriptions)
}

fn message(subscription: &str, destination: &str, id: u32, body: &str) -> Frame {
    Frame::new(Command::Message)
        .header("destination", destination)
        .header("content-type", "application/json")
        .header("subscription", subscription)
        .header("message-id", id.to_string())
        .header("content-length", body.len().to_string())
        .with_body(body)
}

#[tokio::test]
async fn full_session_lifecycle() {
    let _ = tracing_subscriber::fmt::try_init();

    let (addr, server) = broker(|mut ws| async move {
        let (connect, subscriptions) = handshake(&mut ws).await;
        let lap_sub = subscriptions["/topic/lap"].clone();
        let pit_sub = subscriptions["/topic/pit"].clone();

        let bodies = [
            (&lap_sub, "/topic/lap", LAP_MARC),
            (&lap_sub, "/topic/lap", r#"{"rider":{"name":"Marc"}}"#),
            (&pit_sub, "/topic/pit", PIT_PECCO),
            (&lap_sub, "/topic/lap", LAP_PECCO),
        ];
        for (i, (sub, destination, body)) in bodies.into_iter().enumerate() {
            send(&mut ws, message(sub, destination, i as u32, body)).await;
        }
        // heart-beat EOL between frames
        ws.send(Message::Text("\n".into())).await.unwrap();

        let mut closing = Vec::new();
        while let Some(frame) = next_frame(&mut ws).await {
            closing.push(frame.command);
            if frame.command == Command::Disconnect {
                let receipt = frame.get("receipt").unwrap().to_string();
                send(&mut ws, Frame::new(Command::Receipt).header("receipt-id", receipt)).await;
                break;
            }
        }
        (connect, closing)
    })
    .await;

    let feed = RaceFeed::connect(FeedConfig::new(format!("ws://{addr}/ws"))).unwrap();
    let state = tokio::time::timeout(
        WAIT,
        feed.wait_for(|s| s.laps().len() == 2 && s.pit_stops().len() == 1),
    )
    .await
    .expect("messages not delivered")
    .expect("feed task ended");

    assert_eq!(state.status(), &ConnectionStatus::Live);
    assert_eq!(
        state.laps(),
        ["🏁 Marc completed lap 3 in 98213ms", "🏁 Pecco completed lap 3 in 99001ms"]
    );
    assert_eq!(state.pit_stops(), ["🛠️ Pecco is in pit for tire change (wait: 4200ms)"]);

    let last = feed.deactivate().await;
    assert_eq!(last.status(), &ConnectionStatus::Disconnected);

    let (connect, closing) = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.get("accept-version"), Some("1.2,1.1,1.0"));
    assert_eq!(connect.get("host"), Some("127.0.0.1"));
    assert_eq!(closing, vec![Command::Unsubscribe, Command::Unsubscribe, Command::Disconnect]);
}

#[tokio::test]
async fn error_frame_during_handshake_is_rejected() {
    let (addr, _server) = broker(|mut ws| async move {
        let _connect = next_frame(&mut ws).await;
        send(
            &mut ws,
            Frame::new(Command::Error).header("message", "Bad credentials").with_body("denied"),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    })
    .await;

    let err = StompTransport::new()
        .connect(&format!("ws://{addr}/ws"))
        .await
        .err()
        .expect("handshake rejected");
    match err {
        FeedError::Handshake { reason } => assert_eq!(reason, "Bad credentials"),
        other => panic!("Expected Handshake error, got {other:?}"),
    }
}

#[tokio::test]
async fn broker_error_ends_the_feed() {
    let (addr, _server) = broker(|mut ws| async move {
        let (_, subscriptions) = handshake(&mut ws).await;
        send(&mut ws, message(&subscriptions["/topic/pit"], "/topic/pit", 1, PIT_JORGE)).await;
        send(&mut ws, Frame::new(Command::Error).header("message", "broker shutting down")).await;
    })
    .await;

    let feed = RaceFeed::connect(FeedConfig::new(format!("ws://{addr}/ws"))).unwrap();
    let state = tokio::time::timeout(
        WAIT,
        feed.wait_for(|s| s.status() == &ConnectionStatus::Disconnected),
    )
    .await
    .expect("feed did not notice the broker error")
    .expect("final status observed");

    assert_eq!(state.pit_stops(), ["🛠️ Jorge is in pit for Fuel (wait: 0ms)"]);
}

#[tokio::test]
async fn stalled_handshake_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        // accept the socket but never answer the WebSocket upgrade
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let timeout = Duration::from_millis(200);
    let err = StompTransport::new()
        .with_connect_timeout(timeout)
        .connect(&format!("ws://{addr}/ws"))
        .await
        .err()
        .expect("handshake stalls");
    match err {
        FeedError::Timeout { duration } => assert_eq!(duration, timeout),
        other => panic!("Expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn deactivate_during_stalled_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted_rx) = oneshot::channel();
    let _server = tokio::spawn(async move {
        // hold the socket open without answering the upgrade
        let (stream, _) = listener.accept().await.unwrap();
        let _ = accepted_tx.send(());
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let feed = RaceFeed::connect(FeedConfig::new(format!("ws://{addr}/ws"))).unwrap();
    tokio::time::timeout(WAIT, accepted_rx).await.unwrap().unwrap();
    assert_eq!(feed.status(), ConnectionStatus::Connecting);

    let last = tokio::time::timeout(Duration::from_secs(1), feed.deactivate())
        .await
        .expect("deactivate waited on the handshake");
    assert_eq!(last.status(), &ConnectionStatus::Disconnected);
    assert!(last.laps().is_empty());
    assert!(last.pit_stops().is_empty());
}

#[tokio::test]
async fn secure_endpoint_starts_a_tls_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut record = [0u8; 3];
        stream.read_exact(&mut record).await.unwrap();
        record
    });

    let err = StompTransport::new()
        .with_connect_timeout(Duration::from_secs(2))
        .connect(&format!("wss://localhost:{}/ws", addr.port()))
        .await
        .err()
        .expect("plain TCP peer cannot complete TLS");
    assert!(matches!(err, FeedError::Connection { .. } | FeedError::Timeout { .. }));

    // TLS handshake record carrying a ClientHello
    let record = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(record[0], 0x16);
    assert_eq!(record[1], 0x03);
}

#[tokio::test]
async fn stomp_10_broker_headers_are_not_unescaped() {
    let (addr, _server) = broker(|mut ws| async move {
        let _connect = next_frame(&mut ws).await;
        // a 1.0 broker: no version header, backslashes are literal
        send(&mut ws, Frame::new(Command::Connected).header("session", "s-1")).await;

        let mut laps = None;
        while laps.is_none() {
            let frame = next_frame(&mut ws).await.expect("SUBSCRIBE");
            if frame.get("destination") == Some("/topic/lap") {
                laps = frame.get("id").map(str::to_string);
            }
        }
        let laps = laps.unwrap();

        // raw wire text; Frame::encode would escape the backslash
        let raw = format!(
            "MESSAGE\ndestination:/topic/lap\nsubscription:{laps}\norigin:C:\\feeds\n\n{LAP_MARC}\0"
        );
        let batch = raw + &message(&laps, "/topic/lap", 2, LAP_PECCO).encode();
        ws.send(Message::Text(batch.into())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let feed = RaceFeed::connect(FeedConfig::new(format!("ws://{addr}/ws"))).unwrap();
    let state = tokio::time::timeout(WAIT, feed.wait_for(|s| s.laps().len() == 2))
        .await
        .expect("both frames in the batch delivered")
        .expect("feed task ended");
    assert_eq!(
        state.laps(),
        ["🏁 Marc completed lap 3 in 98213ms", "🏁 Pecco completed lap 3 in 99001ms"]
    );
}
