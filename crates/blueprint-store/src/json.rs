//! JSON (de)serialization helpers shared by every sub-container.

use crate::error::StoreError;

pub fn to_json<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(v).map_err(StoreError::Serialization)
}

pub fn from_json<T: serde::de::DeserializeOwned>(v: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(v).map_err(StoreError::Serialization)
}
