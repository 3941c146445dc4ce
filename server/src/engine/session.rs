use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a connected session (one per connection, not per user).
pub type SessionId = Uuid;

/// A serialized envelope, shared across every recipient of one broadcast.
pub type OutboundFrame = Arc<str>;

/// One live connection: the claimed display name, the active guild, and the
/// bounded queue feeding this session's write loop. Display names are not
/// unique; two sessions may legitimately carry the same name.
#[derive(Debug)]
pub struct RelaySession {
    pub id: SessionId,
    pub display_name: String,
    /// None until the session issues its first `switch_guild`.
    pub current_guild: Option<String>,
    outbound: mpsc::Sender<OutboundFrame>,
    pub connected_at: DateTime<Utc>,
}

impl RelaySession {
    pub fn new(id: SessionId, display_name: String, outbound: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id,
            display_name,
            current_guild: None,
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Queue a frame for delivery. Returns false if the write loop is gone
    /// or the queue is full (slow client — the frame is dropped rather than
    /// blocking the broadcast).
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.outbound.try_send(frame).is_ok()
    }
}
