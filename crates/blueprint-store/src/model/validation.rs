use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ValidationId;

/// Status of an asynchronous blueprint validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    InProgress,
    Valid,
    Invalid,
    Failed,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::InProgress => "in_progress",
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ValidationStatus::Pending,
            "in_progress" => ValidationStatus::InProgress,
            "valid" => ValidationStatus::Valid,
            "invalid" => ValidationStatus::Invalid,
            "failed" => ValidationStatus::Failed,
            other => return Err(format!("unrecognized validation status: {other}")),
        })
    }
}

/// An asynchronous request to validate a blueprint document, keyed by id.
/// Independent lifecycle; not tied to any instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub id: ValidationId,
    pub blueprint_location: String,
    pub status: ValidationStatus,
    pub created: DateTime<Utc>,
}
