//! Live race feed in the terminal.
//!
//! Connects to the race server and redraws both feeds whenever they change.
//!
//! ```text
//! RACEFEED_ENDPOINT=ws://localhost:8080/ws cargo run --example live_feed
//! RACEFEED_CONFIG=racefeed.yaml cargo run --example live_feed
//! ```

use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use racefeed::stream::CoalesceExt;
use racefeed::{FeedConfig, RaceFeed, view};
use tracing_subscriber::EnvFilter;

/// Renders closer together than this are merged
const RENDER_WINDOW: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("RACEFEED_CONFIG") {
        Ok(path) => FeedConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        Err(_) => FeedConfig::default(),
    }
    .with_env_override()?;

    let feed = RaceFeed::connect(config)?;
    let mut renders = Box::pin(feed.updates().coalesce(RENDER_WINDOW));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = renders.next() => match next {
                Some(state) => print!("\x1b[2J\x1b[H{}", view::render(&state)),
                None => break,
            },
        }
    }

    drop(renders);
    let last = feed.deactivate().await;
    println!("{}", view::render_status(last.status()));
    Ok(())
}
