use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ResourceId;

use super::Tree;

/// Records that a resource's real-world state has diverged from its stored
/// spec. Tied 1:1 to the resource; its removal resets the owning
/// resource's `drifted` flag to `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDrift {
    pub resource_id: ResourceId,
    pub drifted_spec_data: Tree,
    /// Tree of new/modified/removed/unchanged field paths.
    pub difference: Tree,
    pub timestamp: DateTime<Utc>,
}

impl ResourceDrift {
    /// The empty drift record `Resources::get_drift` returns for a resource
    /// that exists but has no drift row — not an error.
    pub fn empty(resource_id: ResourceId, now: DateTime<Utc>) -> Self {
        Self {
            resource_id,
            drifted_spec_data: Tree::default(),
            difference: Tree::default(),
            timestamp: now,
        }
    }
}
