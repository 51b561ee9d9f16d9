use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChangesetId, InstanceId};

use super::Tree;

/// Status of a staged change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangesetStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl std::fmt::Display for ChangesetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::InProgress => "in_progress",
            ChangesetStatus::Complete => "complete",
            ChangesetStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChangesetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ChangesetStatus::Pending,
            "in_progress" => ChangesetStatus::InProgress,
            "complete" => ChangesetStatus::Complete,
            "failed" => ChangesetStatus::Failed,
            other => return Err(format!("unrecognized changeset status: {other}")),
        })
    }
}

/// A staged, inspectable description of pending changes to an instance.
/// Independent lifecycle from the instance it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changeset {
    pub id: ChangesetId,
    pub instance_id: InstanceId,
    pub destroy: bool,
    pub status: ChangesetStatus,
    pub blueprint_location: String,
    #[serde(default = "Tree::default")]
    pub changes: Tree,
    pub created: DateTime<Utc>,
}
