//! In-memory query backend (non-persistent).
//!
//! Evaluates `is`, `is_not`, `in`, `not_in` and `in_last` clauses on top-level
//! fields and dotted link paths (`sg_task.Task.step`). Every call is recorded
//! so tests can assert on the filters an entity method produced.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use super::{Api, BatchRequest, UpdateMode, UpdateModes};
use crate::error::{SgError, SgResult};
use crate::fields::{field_map, to_value, EntityRef, FieldMap};
use crate::filters::{Direction, Filter, Operator, Order};

/// A call made against the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub entity_type: String,
    pub filters: Vec<Filter>,
    pub fields: Vec<String>,
    pub limit: usize,
    pub data: Option<FieldMap>,
}

impl RecordedCall {
    fn new(method: &'static str, entity_type: &str) -> Self {
        Self {
            method,
            entity_type: entity_type.to_string(),
            filters: Vec::new(),
            fields: Vec::new(),
            limit: 0,
            data: None,
        }
    }
}

#[derive(Default)]
struct Tables {
    live: IndexMap<String, Vec<FieldMap>>,
    retired: IndexMap<String, Vec<FieldMap>>,
    next_id: i64,
    calls: Vec<RecordedCall>,
    upload_failures: usize,
    upload_attempts: usize,
    blobs: HashMap<String, Vec<u8>>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn get(&self, entity_type: &str, id: i64) -> Option<&FieldMap> {
        self.live
            .get(entity_type)
            .and_then(|rows| rows.iter().find(|r| record_id(r) == Some(id)))
    }

    fn get_mut(&mut self, entity_type: &str, id: i64) -> Option<&mut FieldMap> {
        self.live
            .get_mut(entity_type)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
    }

    fn insert(&mut self, entity_type: &str, data: &FieldMap) -> FieldMap {
        let id = self.allocate_id();
        let mut record = FieldMap::new();
        record.insert("type".to_string(), Value::from(entity_type));
        record.insert("id".to_string(), Value::from(id));
        record.insert("created_at".to_string(), Value::from(now_secs()));
        for (k, v) in data {
            if k != "id" && k != "type" {
                record.insert(k.clone(), v.clone());
            }
        }
        self.live
            .entry(entity_type.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    fn update(
        &mut self,
        entity_type: &str,
        id: i64,
        data: &FieldMap,
        modes: Option<&UpdateModes>,
    ) -> SgResult<FieldMap> {
        let record = self.get_mut(entity_type, id).ok_or_else(|| {
            SgError::api_status(404, format!("{} with id {} not found", entity_type, id))
        })?;
        let mut echo = FieldMap::new();
        echo.insert("type".to_string(), Value::from(entity_type));
        echo.insert("id".to_string(), Value::from(id));
        for (field, value) in data {
            let mode = modes
                .and_then(|m| m.get(field))
                .copied()
                .unwrap_or(UpdateMode::Set);
            let merged = merge_multi(record.get(field), value, mode);
            record.insert(field.clone(), merged.clone());
            echo.insert(field.clone(), merged);
        }
        Ok(echo)
    }

    fn retire(&mut self, entity_type: &str, id: i64) -> bool {
        let Some(rows) = self.live.get_mut(entity_type) else {
            return false;
        };
        match rows.iter().position(|r| record_id(r) == Some(id)) {
            Some(pos) => {
                let record = rows.remove(pos);
                self.retired
                    .entry(entity_type.to_string())
                    .or_default()
                    .push(record);
                true
            }
            None => false,
        }
    }

    fn revive(&mut self, entity_type: &str, id: i64) -> bool {
        let Some(rows) = self.retired.get_mut(entity_type) else {
            return false;
        };
        match rows.iter().position(|r| record_id(r) == Some(id)) {
            Some(pos) => {
                let record = rows.remove(pos);
                self.live
                    .entry(entity_type.to_string())
                    .or_default()
                    .push(record);
                true
            }
            None => false,
        }
    }

    /// Resolve a field, following `link.Type.field` paths through linked records.
    fn resolve(&self, record: &FieldMap, path: &str) -> Value {
        let mut parts = path.splitn(3, '.');
        let head = parts.next().unwrap_or_default();
        let value = record.get(head).cloned().unwrap_or(Value::Null);
        match (parts.next(), parts.next()) {
            (Some(linked_type), Some(rest)) => EntityRef::from_value(&value)
                .filter(|link| link.entity_type == linked_type)
                .and_then(|link| self.get(&link.entity_type, link.id))
                .map(|linked| self.resolve(linked, rest))
                .unwrap_or(Value::Null),
            _ => value,
        }
    }

    fn matches(&self, record: &FieldMap, filter: &Filter) -> SgResult<bool> {
        let actual = self.resolve(record, &filter.field);
        let expected = filter.value();
        Ok(match filter.operator {
            Operator::Is => contains_or_equal(&actual, expected),
            Operator::IsNot => !contains_or_equal(&actual, expected),
            Operator::In => expected
                .as_array()
                .map(|items| items.iter().any(|v| values_equal(&actual, v)))
                .unwrap_or(false),
            Operator::NotIn => !expected
                .as_array()
                .map(|items| items.iter().any(|v| values_equal(&actual, v)))
                .unwrap_or(false),
            Operator::InLast => {
                let amount = expected.as_i64().unwrap_or(0);
                let unit = filter.values.get(1).and_then(Value::as_str).unwrap_or("DAY");
                let window = amount * unit_secs(unit);
                actual
                    .as_i64()
                    .map(|created| now_secs() - created <= window)
                    .unwrap_or(false)
            }
            other => {
                return Err(SgError::api(format!(
                    "Operator '{}' is not supported by the in-memory backend",
                    other
                )))
            }
        })
    }
}

/// In-memory implementation of [`Api`].
#[derive(Default)]
pub struct InMemoryApi {
    tables: Mutex<Tables>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a record directly, bypassing call recording. Returns the stored record.
    pub fn insert(&self, entity_type: &str, data: Value) -> FieldMap {
        self.lock().insert(entity_type, &field_map(data))
    }

    /// Current stored state of a record.
    pub fn record(&self, entity_type: &str, id: i64) -> Option<FieldMap> {
        self.lock().get(entity_type, id).cloned()
    }

    /// Number of live records of a type.
    pub fn count(&self, entity_type: &str) -> usize {
        self.lock().live.get(entity_type).map(Vec::len).unwrap_or(0)
    }

    /// Make the next `n` upload attempts fail with a vendor error.
    pub fn fail_uploads(&self, n: usize) {
        self.lock().upload_failures = n;
    }

    /// Total upload attempts made so far.
    pub fn upload_attempts(&self) -> usize {
        self.lock().upload_attempts
    }

    /// Register bytes served for an attachment URL.
    pub fn put_blob(&self, url: &str, bytes: Vec<u8>) {
        self.lock().blobs.insert(url.to_string(), bytes);
    }

    /// All calls made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Most recent call with the given method name.
    pub fn last_call(&self, method: &str) -> Option<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find(|c| c.method == method)
            .cloned()
    }
}

#[async_trait]
impl Api for InMemoryApi {
    async fn find(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: &[&str],
        limit: usize,
        order: &[Order],
    ) -> SgResult<Vec<FieldMap>> {
        let mut tables = self.lock();
        let mut call = RecordedCall::new("find", entity_type);
        call.filters = filters.to_vec();
        call.fields = fields.iter().map(|f| f.to_string()).collect();
        call.limit = limit;
        tables.calls.push(call);

        let mut rows = Vec::new();
        if let Some(records) = tables.live.get(entity_type) {
            for record in records {
                let mut keep = true;
                for filter in filters {
                    if !tables.matches(record, filter)? {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    rows.push(record.clone());
                }
            }
        }

        for o in order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&o.field_name), b.get(&o.field_name))
                    .then_with(|| record_id(a).cmp(&record_id(b)));
                match o.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows.iter().map(|r| project(r, fields)).collect())
    }

    async fn create(&self, entity_type: &str, data: &FieldMap) -> SgResult<FieldMap> {
        let mut tables = self.lock();
        let mut call = RecordedCall::new("create", entity_type);
        call.data = Some(data.clone());
        tables.calls.push(call);
        Ok(tables.insert(entity_type, data))
    }

    async fn update(
        &self,
        entity_type: &str,
        id: i64,
        data: &FieldMap,
        modes: Option<&UpdateModes>,
    ) -> SgResult<FieldMap> {
        let mut tables = self.lock();
        let mut call = RecordedCall::new("update", entity_type);
        call.data = Some(data.clone());
        tables.calls.push(call);
        tables.update(entity_type, id, data, modes)
    }

    async fn delete(&self, entity_type: &str, id: i64) -> SgResult<bool> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::new("delete", entity_type));
        Ok(tables.retire(entity_type, id))
    }

    async fn revive(&self, entity_type: &str, id: i64) -> SgResult<bool> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::new("revive", entity_type));
        Ok(tables.revive(entity_type, id))
    }

    async fn upload(
        &self,
        entity_type: &str,
        id: i64,
        path: &Path,
        field_name: &str,
    ) -> SgResult<bool> {
        {
            let mut tables = self.lock();
            tables.calls.push(RecordedCall::new("upload", entity_type));
            tables.upload_attempts += 1;
            if tables.upload_failures > 0 {
                tables.upload_failures -= 1;
                return Err(SgError::api("Simulated upload failure"));
            }
        }

        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let url = format!("memory://{}/{}/{}/{}", entity_type, id, field_name, name);

        let mut tables = self.lock();
        let record = tables.get_mut(entity_type, id).ok_or_else(|| {
            SgError::api_status(404, format!("{} with id {} not found", entity_type, id))
        })?;
        record.insert(
            field_name.to_string(),
            serde_json::json!({ "name": name, "url": url, "link_type": "upload" }),
        );
        tables.blobs.insert(url, bytes);
        Ok(true)
    }

    async fn batch(&self, requests: &[BatchRequest]) -> SgResult<Vec<Value>> {
        let mut tables = self.lock();
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let mut call = RecordedCall::new("batch", request.entity_type());
            let result = match request {
                BatchRequest::Create { entity_type, data } => {
                    call.data = Some(data.clone());
                    to_value(&tables.insert(entity_type, data))
                }
                BatchRequest::Update {
                    entity_type,
                    entity_id,
                    data,
                } => {
                    call.data = Some(data.clone());
                    to_value(&tables.update(entity_type, *entity_id, data, None)?)
                }
                BatchRequest::Delete {
                    entity_type,
                    entity_id,
                } => Value::Bool(tables.retire(entity_type, *entity_id)),
            };
            tables.calls.push(call);
            results.push(result);
        }
        Ok(results)
    }

    async fn download(&self, url: &str, dest: &Path) -> SgResult<u64> {
        let bytes = self
            .lock()
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| SgError::api_status(404, format!("No attachment at {}", url)))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

fn record_id(record: &FieldMap) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn unit_secs(unit: &str) -> i64 {
    match unit {
        "HOUR" => 3_600,
        "DAY" => 86_400,
        "WEEK" => 604_800,
        "MONTH" => 2_592_000,
        "YEAR" => 31_536_000,
        _ => 86_400,
    }
}

/// Links compare by `(type, id)`; everything else by value.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (EntityRef::from_value(actual), EntityRef::from_value(expected)) {
        (Some(a), Some(b)) => a.entity_type == b.entity_type && a.id == b.id,
        _ => actual == expected,
    }
}

/// Multi-entity fields match a scalar when any element does.
fn contains_or_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(items), e) if !e.is_array() => items.iter().any(|v| values_equal(v, e)),
        _ => values_equal(actual, expected),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn merge_multi(current: Option<&Value>, incoming: &Value, mode: UpdateMode) -> Value {
    let existing: Vec<Value> = current
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let incoming_items = incoming.as_array().cloned().unwrap_or_default();
    match mode {
        UpdateMode::Set => incoming.clone(),
        UpdateMode::Add => {
            let mut merged = existing;
            for item in incoming_items {
                if !merged.iter().any(|v| values_equal(v, &item)) {
                    merged.push(item);
                }
            }
            Value::Array(merged)
        }
        UpdateMode::Remove => Value::Array(
            existing
                .into_iter()
                .filter(|v| !incoming_items.iter().any(|i| values_equal(v, i)))
                .collect(),
        ),
    }
}

/// Keep `type`, `id` and the requested fields (missing ones as null).
fn project(record: &FieldMap, fields: &[&str]) -> FieldMap {
    let mut out = FieldMap::new();
    for key in ["type", "id"] {
        if let Some(v) = record.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    for field in fields {
        if !out.contains_key(*field) {
            out.insert(
                field.to_string(),
                record.get(*field).cloned().unwrap_or(Value::Null),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_find_filters_and_projection() {
        let api = InMemoryApi::new();
        let project = api.insert("Project", json!({"name": "Demo"}));
        let project_ref = EntityRef::from_map(&project).unwrap();
        api.insert("Shot", json!({"code": "SH010", "project": project_ref.to_value()}));
        api.insert("Shot", json!({"code": "SH020", "project": {"type": "Project", "id": 999}}));

        let rows = api
            .find(
                "Shot",
                &[Filter::is("project", project_ref.to_value())],
                &["code"],
                0,
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["code"], json!("SH010"));
        assert!(!rows[0].contains_key("project"));
        assert_eq!(api.last_call("find").unwrap().filters.len(), 1);
    }

    #[tokio::test]
    async fn test_dotted_path_filter() {
        let api = InMemoryApi::new();
        let step = api.insert("Step", json!({"short_name": "comp"}));
        let task = api.insert("Task", json!({"content": "comp", "step": {"type": "Step", "id": step["id"]}}));
        api.insert("Version", json!({"code": "v001", "sg_task": {"type": "Task", "id": task["id"]}}));
        api.insert("Version", json!({"code": "v002"}));

        let rows = api
            .find(
                "Version",
                &[Filter::is("sg_task.Task.step", json!({"type": "Step", "id": step["id"]}))],
                &["code"],
                0,
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["code"], json!("v001"));
    }

    #[tokio::test]
    async fn test_update_modes_and_retire() {
        let api = InMemoryApi::new();
        let pl = api.insert("Playlist", json!({"versions": [{"type": "Version", "id": 1}]}));
        let id = pl["id"].as_i64().unwrap();

        let mut modes = UpdateModes::new();
        modes.insert("versions".to_string(), UpdateMode::Add);
        let data = field_map(json!({"versions": [{"type": "Version", "id": 2}]}));
        let echo = api.update("Playlist", id, &data, Some(&modes)).await.unwrap();
        assert_eq!(echo["versions"].as_array().unwrap().len(), 2);

        assert!(api.delete("Playlist", id).await.unwrap());
        assert!(!api.delete("Playlist", id).await.unwrap());
        assert_eq!(api.count("Playlist"), 0);
        assert!(api.revive("Playlist", id).await.unwrap());
        assert_eq!(api.count("Playlist"), 1);
    }

    #[tokio::test]
    async fn test_is_matches_multi_entity_field() {
        let api = InMemoryApi::new();
        api.insert("Shot", json!({"code": "SH010", "tags": [{"type": "Tag", "id": 341}]}));
        api.insert("Shot", json!({"code": "SH020", "tags": []}));
        let rows = api
            .find("Shot", &[Filter::is("tags", json!({"type": "Tag", "id": 341}))], &["code"], 0, &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["code"], json!("SH010"));
    }

    #[tokio::test]
    async fn test_unsupported_operator() {
        let api = InMemoryApi::new();
        api.insert("Shot", json!({"code": "SH010"}));
        let err = api
            .find("Shot", &[Filter::new("code", Operator::Contains, "SH")], &[], 0, &[])
            .await
            .unwrap_err();
        assert!(err.is_vendor());
    }
}
