//! Plain-text rendering of the feeds

use std::fmt;

use crate::state::ViewState;
use crate::types::{Channel, ConnectionStatus};

/// Heading printed above the feeds
pub const HEADING: &str = "🏍️ MotoGP Live Race Feed";

/// Line shown for a feed that has no entries yet
const EMPTY_FEED: &str = "  (no events yet)";

/// Render a snapshot: heading, connection status, then each feed as a
/// numbered list in arrival order.
pub fn render(state: &ViewState) -> String {
    FeedView(state).to_string()
}

/// One-line connection indicator
pub fn render_status(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => "Status: connecting".to_string(),
        ConnectionStatus::Live => "Status: live".to_string(),
        ConnectionStatus::Degraded { unavailable } => {
            format!("Status: live ({unavailable} feed unavailable)")
        }
        ConnectionStatus::Disconnected => "Status: disconnected".to_string(),
        ConnectionStatus::Failed { reason } => format!("Status: failed ({reason})"),
    }
}

/// `Display` adapter over a snapshot
pub struct FeedView<'a>(pub &'a ViewState);

impl fmt::Display for FeedView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{HEADING}")?;
        writeln!(f, "{}", render_status(self.0.status()))?;

        for channel in Channel::ALL {
            writeln!(f)?;
            writeln!(f, "{}", channel.label())?;

            let lines = self.0.feed(channel);
            if lines.is_empty() {
                writeln!(f, "{EMPTY_FEED}")?;
            }
            for (index, line) in lines.iter().enumerate() {
                writeln!(f, "{:>3}. {}", index + 1, line)?;
            }
        }
        Ok(())
    }
}
