//! Status enums shared by instances, resources and links.
//!
//! Every entity carries a coarse status; resources and links additionally
//! carry a second, finer-grained "precise status" tracking the phase within
//! the coarse one. See DESIGN.md for how the variant sets below were chosen.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("unrecognized status code: {0}")]
pub struct UnknownStatusCode(pub i16);

/// Coarse deployment status, shared by instances, resources and links.
///
/// Serializes as the `smallint` code it is persisted as (not its variant
/// name) so that the `jsonb_build_object(...)` read views in
/// `migrations.rs` — which embed the raw column value — deserialize
/// straight into this type without a separate translation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum DeploymentStatus {
    Preparing = 0,
    Deploying = 1,
    Deployed = 2,
    DeployFailed = 3,
    Destroying = 4,
    Destroyed = 5,
    DestroyFailed = 6,
    Updating = 7,
    Updated = 8,
    UpdateFailed = 9,
    RollingBack = 10,
    RolledBack = 11,
    RollbackFailed = 12,
}

impl From<DeploymentStatus> for i16 {
    fn from(s: DeploymentStatus) -> i16 {
        s as i16
    }
}

impl TryFrom<i16> for DeploymentStatus {
    type Error = UnknownStatusCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        use DeploymentStatus::*;
        Ok(match v {
            0 => Preparing,
            1 => Deploying,
            2 => Deployed,
            3 => DeployFailed,
            4 => Destroying,
            5 => Destroyed,
            6 => DestroyFailed,
            7 => Updating,
            8 => Updated,
            9 => UpdateFailed,
            10 => RollingBack,
            11 => RolledBack,
            12 => RollbackFailed,
            other => return Err(UnknownStatusCode(other)),
        })
    }
}

/// Fine-grained sub-status of a resource or link's deployment, tracking the
/// phase within a coarse [`DeploymentStatus`] (e.g. "creating" vs. "config
/// complete" within `Deploying`). Same integer-coded serde representation
/// as [`DeploymentStatus`], for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum PreciseStatus {
    Pending = 0,
    Creating = 1,
    ConfigComplete = 2,
    Created = 3,
    Updating = 4,
    UpdateConfigComplete = 5,
    Updated = 6,
    Destroying = 7,
    Destroyed = 8,
    Failed = 9,
    RollingBack = 10,
    RolledBack = 11,
}

impl From<PreciseStatus> for i16 {
    fn from(s: PreciseStatus) -> i16 {
        s as i16
    }
}

impl TryFrom<i16> for PreciseStatus {
    type Error = UnknownStatusCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        use PreciseStatus::*;
        Ok(match v {
            0 => Pending,
            1 => Creating,
            2 => ConfigComplete,
            3 => Created,
            4 => Updating,
            5 => UpdateConfigComplete,
            6 => Updated,
            7 => Destroying,
            8 => Destroyed,
            9 => Failed,
            10 => RollingBack,
            11 => RolledBack,
            other => return Err(UnknownStatusCode(other)),
        })
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Preparing => "preparing",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::DeployFailed => "deploy_failed",
            DeploymentStatus::Destroying => "destroying",
            DeploymentStatus::Destroyed => "destroyed",
            DeploymentStatus::DestroyFailed => "destroy_failed",
            DeploymentStatus::Updating => "updating",
            DeploymentStatus::Updated => "updated",
            DeploymentStatus::UpdateFailed => "update_failed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::RolledBack => "rolled_back",
            DeploymentStatus::RollbackFailed => "rollback_failed",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PreciseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PreciseStatus::Pending => "pending",
            PreciseStatus::Creating => "creating",
            PreciseStatus::ConfigComplete => "config_complete",
            PreciseStatus::Created => "created",
            PreciseStatus::Updating => "updating",
            PreciseStatus::UpdateConfigComplete => "update_config_complete",
            PreciseStatus::Updated => "updated",
            PreciseStatus::Destroying => "destroying",
            PreciseStatus::Destroyed => "destroyed",
            PreciseStatus::Failed => "failed",
            PreciseStatus::RollingBack => "rolling_back",
            PreciseStatus::RolledBack => "rolled_back",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_status_round_trips_through_i16() {
        for code in 0..=12i16 {
            let status = DeploymentStatus::try_from(code).unwrap();
            assert_eq!(i16::from(status), code);
        }
    }

    #[test]
    fn precise_status_round_trips_through_i16() {
        for code in 0..=11i16 {
            let status = PreciseStatus::try_from(code).unwrap();
            assert_eq!(i16::from(status), code);
        }
    }

    #[test]
    fn unknown_status_code_is_rejected() {
        assert!(DeploymentStatus::try_from(99).is_err());
        assert!(PreciseStatus::try_from(99).is_err());
    }

    #[test]
    fn deployment_status_serializes_as_its_integer_code() {
        let json = serde_json::to_value(DeploymentStatus::Deployed).unwrap();
        assert_eq!(json, serde_json::json!(2));
        let back: DeploymentStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, DeploymentStatus::Deployed);
    }
}
