//! Stable, structured error kinds for the state container.
//!
//! Not-found is never swallowed: every missing-entity path returns one of
//! the typed variants below, carrying the item id the caller supplied or, for
//! entities addressed relative to a parent, a composite id of the form
//! `instance:<id>:resource:<name>` / `...:link:<name>` / `...:child:<name>`.
//! "Malformed id" and FK violations implying a missing parent are folded
//! into the same not-found kind as a genuinely missing row, rather than
//! a distinct "invalid argument" kind.

use thiserror::Error;

/// The Postgres error code for a foreign-key violation.
const FK_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("link not found: {0}")]
    LinkNotFound(String),

    #[error("export not found: {0}")]
    ExportNotFound(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("changeset not found: {0}")]
    ChangesetNotFound(String),

    #[error("validation not found: {0}")]
    ValidationNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row violated an invariant the store itself is responsible for
    /// (e.g. an unrecognized status code), as opposed to a transport fault.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Build the composite item id used for nested not-found errors, e.g.
    /// `instance:8029…-4139d:child:networking`.
    pub fn composite_id(instance_id: impl std::fmt::Display, kind: &str, name: &str) -> String {
        format!("instance:{instance_id}:{kind}:{name}")
    }

    /// True if this is a FK-violation wrapping a missing parent row, i.e. one
    /// that should be translated to a not-found kind by the caller instead of
    /// surfaced as a raw database fault.
    pub fn is_fk_violation(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == FK_VIOLATION)
            .unwrap_or(false)
    }

    /// Translate a database error into `InstanceNotFound` if it is an FK
    /// violation against the instance table, otherwise wrap it unchanged.
    pub fn from_insert_error(err: sqlx::Error, instance_id: impl std::fmt::Display) -> Self {
        if Self::is_fk_violation(&err) {
            StoreError::InstanceNotFound(instance_id.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_formats_as_expected() {
        let id = StoreError::composite_id("8029-4139d", "child", "networking");
        assert_eq!(id, "instance:8029-4139d:child:networking");
    }
}
