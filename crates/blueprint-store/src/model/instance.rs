use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;

use super::status::DeploymentStatus;
use super::{Export, Link, Resource, Tree};

/// A deployed realization of a declarative graph: the aggregate root of
/// resources, links, exports, metadata, and child instances.
///
/// `resources`/`links` are keyed by logical name (unique within the
/// instance); `children` is keyed by the child-relation's `child_name` and,
/// on `Instances::get`, is populated recursively to arbitrary depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: Option<String>,
    pub status: DeploymentStatus,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "Tree::default")]
    pub metadata: Tree,
    #[serde(default)]
    pub exports: HashMap<String, Export>,
    /// Dependency record written by `Children::save_dependencies`, keyed by
    /// child name.
    #[serde(default)]
    pub child_dependencies: HashMap<String, Tree>,
    #[serde(default = "Tree::default")]
    pub durations: Tree,
    #[serde(default)]
    pub resources: HashMap<String, Resource>,
    #[serde(default)]
    pub links: HashMap<String, Link>,
    #[serde(default)]
    pub children: HashMap<String, Instance>,
}

impl Instance {
    /// A fresh, empty instance ready to be populated before `Save`.
    pub fn new(name: Option<String>) -> Self {
        Self {
            id: InstanceId::new(),
            name,
            status: DeploymentStatus::Preparing,
            last_status_update_timestamp: None,
            last_deployed_timestamp: None,
            last_deploy_attempt_timestamp: None,
            metadata: Tree::default(),
            exports: HashMap::new(),
            child_dependencies: HashMap::new(),
            durations: Tree::default(),
            resources: HashMap::new(),
            links: HashMap::new(),
            children: HashMap::new(),
        }
    }
}

/// Partial-update payload for `Instances::update_status`. Only
/// `Some` fields are written; zero rows affected maps to `InstanceNotFound`.
#[derive(Debug, Clone, Default)]
pub struct InstanceStatusInfo {
    pub status: Option<DeploymentStatus>,
    pub last_status_update_timestamp: Option<DateTime<Utc>>,
    pub last_deployed_timestamp: Option<DateTime<Utc>>,
    pub last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    pub durations: Option<Tree>,
}
