use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, LinkId};

use super::status::{DeploymentStatus, PreciseStatus};
use super::{FailureReason, Tree};

/// A named directed association between two resources in the same instance.
/// `name` always has the literal form `"A::B"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub instance_id: InstanceId,
    /// Of the form `"A::B"` where `A`/`B` are resource names in this instance.
    pub name: String,
    pub status: DeploymentStatus,
    pub precise_status: PreciseStatus,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub intermediary_resources: Vec<String>,
    #[serde(default = "Tree::default")]
    pub data: Tree,
    #[serde(default)]
    pub failure_reasons: Vec<FailureReason>,
    #[serde(default = "Tree::default")]
    pub durations: Tree,
}

impl Link {
    /// Split `"A::B"` into its two resource names. `None` if the name
    /// doesn't have the expected form (callers enforce the form; the store
    /// itself does not validate it beyond `(instance, name)` uniqueness).
    pub fn resource_names(&self) -> Option<(&str, &str)> {
        self.name.split_once("::")
    }
}

/// Partial-update payload for `Links::update_status`.
#[derive(Debug, Clone, Default)]
pub struct LinkStatusInfo {
    pub status: Option<DeploymentStatus>,
    pub precise_status: Option<PreciseStatus>,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    pub failure_reasons: Option<Vec<FailureReason>>,
    pub durations: Option<Tree>,
}
