use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, EventId};

use super::Tree;

/// An append-only notification on a `(channel_type, channel_id)` channel.
/// `end = true` marks the channel terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: String,
    pub channel_type: String,
    pub channel_id: ChannelId,
    /// Opaque payload; stored as `jsonb` so callers can filter/aggregate by
    /// shape server-side if they need to.
    #[serde(default = "Tree::default")]
    pub data: Tree,
    pub timestamp: DateTime<Utc>,
    pub end: bool,
}
