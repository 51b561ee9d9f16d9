use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, ResourceId};

use super::status::{DeploymentStatus, PreciseStatus};
use super::{FailureReason, Tree};

/// Display metadata attached to a resource, distinct from its `spec_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub display_name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default = "Tree::default")]
    pub custom: Tree,
}

/// A single managed resource within a blueprint instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub instance_id: InstanceId,
    /// Logical name, unique within the owning instance.
    pub name: String,
    pub resource_type: String,
    pub template_name: Option<String>,
    pub template_index: Option<i32>,
    pub status: DeploymentStatus,
    pub precise_status: PreciseStatus,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "Tree::default")]
    pub spec_data: Tree,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub depends_on_resources: Vec<String>,
    #[serde(default)]
    pub depends_on_children: Vec<String>,
    #[serde(default)]
    pub failure_reasons: Vec<FailureReason>,
    /// Mirrors the presence of a [`super::ResourceDrift`] row.
    pub drifted: bool,
    pub last_drift_detected_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "Tree::default")]
    pub durations: Tree,
}

/// Partial-update payload for `Resources::update_status`. Only `Some`
/// fields are written.
#[derive(Debug, Clone, Default)]
pub struct ResourceStatusInfo {
    pub status: Option<DeploymentStatus>,
    pub precise_status: Option<PreciseStatus>,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    pub failure_reasons: Option<Vec<FailureReason>>,
    pub durations: Option<Tree>,
}
