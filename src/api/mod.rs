//! Remote query surface with pluggable backends.
//!
//! Supports:
//! - `rest`: the site's REST API over `reqwest`
//! - `memory`: in-memory tables (non-persistent, for testing)

mod memory;
mod rest;

pub use memory::{InMemoryApi, RecordedCall};
pub use rest::RestClient;

use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SgResult;
use crate::fields::FieldMap;
use crate::filters::{Filter, Order};

/// How a multi-entity field is changed by `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    Set,
    Add,
    Remove,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Set => "set",
            UpdateMode::Add => "add",
            UpdateMode::Remove => "remove",
        }
    }
}

/// Per-field update modes, e.g. `{"versions": Add}`. Unlisted fields are set.
pub type UpdateModes = IndexMap<String, UpdateMode>;

/// One request of a `batch` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "lowercase")]
pub enum BatchRequest {
    Create {
        entity_type: String,
        data: FieldMap,
    },
    Update {
        entity_type: String,
        entity_id: i64,
        data: FieldMap,
    },
    Delete {
        entity_type: String,
        entity_id: i64,
    },
}

impl BatchRequest {
    pub fn delete(entity_type: impl Into<String>, entity_id: i64) -> Self {
        BatchRequest::Delete {
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            BatchRequest::Create { entity_type, .. }
            | BatchRequest::Update { entity_type, .. }
            | BatchRequest::Delete { entity_type, .. } => entity_type,
        }
    }
}

/// Query surface consumed by the entity proxies.
///
/// `fields` lists the fields to return; `type` and `id` are always included.
/// A `limit` of 0 means no limit.
#[async_trait]
pub trait Api: Send + Sync {
    async fn find(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: &[&str],
        limit: usize,
        order: &[Order],
    ) -> SgResult<Vec<FieldMap>>;

    async fn find_one(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: &[&str],
    ) -> SgResult<Option<FieldMap>> {
        let rows = self.find(entity_type, filters, fields, 1, &[]).await?;
        Ok(rows.into_iter().next())
    }

    /// Create an entity; the response carries the assigned id.
    async fn create(&self, entity_type: &str, data: &FieldMap) -> SgResult<FieldMap>;

    /// Update an entity and return the echoed fields.
    async fn update(
        &self,
        entity_type: &str,
        id: i64,
        data: &FieldMap,
        modes: Option<&UpdateModes>,
    ) -> SgResult<FieldMap>;

    /// Retire an entity. Returns `false` when nothing was retired.
    async fn delete(&self, entity_type: &str, id: i64) -> SgResult<bool>;

    /// Restore a retired entity.
    async fn revive(&self, entity_type: &str, id: i64) -> SgResult<bool>;

    /// Upload a local file into an attachment field.
    async fn upload(
        &self,
        entity_type: &str,
        id: i64,
        path: &Path,
        field_name: &str,
    ) -> SgResult<bool>;

    /// Run several create/update/delete requests in one round trip.
    ///
    /// Requests are not transactional; a failure may leave earlier ones applied.
    async fn batch(&self, requests: &[BatchRequest]) -> SgResult<Vec<Value>>;

    /// Stream an attachment URL to a local file, returning the bytes written.
    async fn download(&self, url: &str, dest: &Path) -> SgResult<u64>;
}
