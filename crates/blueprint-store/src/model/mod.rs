//! The durable entity types.

mod changeset;
mod drift;
mod event;
mod instance;
mod link;
mod resource;
mod status;
mod validation;

pub use changeset::{Changeset, ChangesetStatus};
pub use drift::ResourceDrift;
pub use event::Event;
pub use instance::{Instance, InstanceStatusInfo};
pub use link::{Link, LinkStatusInfo};
pub use resource::{Resource, ResourceMetadata, ResourceStatusInfo};
pub use status::{DeploymentStatus, PreciseStatus, UnknownStatusCode};
pub use validation::{Validation, ValidationStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque, free-form JSON tree — used for `spec_data`, `metadata.custom`,
/// drift `difference`, changeset `changes`, link `data`, and `durations`
/// fields. Persisted as `jsonb`.
pub type Tree = serde_json::Value;

/// One entry in a resource or link's `failure_reasons` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A single named export value on an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub value: Tree,
    /// Declared type tag (e.g. `"string"`, `"number"`) of `value`.
    #[serde(rename = "type")]
    pub export_type: String,
    /// Path within the owning resource's spec that produced this export.
    pub field: String,
    pub description: Option<String>,
}
