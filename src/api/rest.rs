//! REST API client for ShotGrid sites.
//!
//! Authenticates with script credentials (client-credentials grant), caches the
//! bearer token until shortly before it expires, and maps the JSON:API style
//! records of `/api/v1` onto flat field maps.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::{Api, BatchRequest, UpdateModes};
use crate::config::Config;
use crate::error::{SgError, SgResult};
use crate::fields::{to_value, FieldMap};
use crate::filters::{Filter, Order};
use crate::media::{stream_download, DEFAULT_CHUNK_SIZE};

const API_PREFIX: &str = "/api/v1";
const SEARCH_CONTENT_TYPE: &str = "application/vnd+shotgun.api3_array+json";
const PAGE_SIZE: usize = 500;
/// Refresh the token this long before the server says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    600
}

/// ShotGrid REST client.
pub struct RestClient {
    client: Client,
    base_url: String,
    script_name: String,
    api_key: String,
    token: RwLock<Option<CachedToken>>,
}

impl RestClient {
    /// Create a new client from connection settings.
    pub fn new(config: &Config) -> SgResult<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SgError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            script_name: config.script_name.clone(),
            api_key: config.api_key.clone(),
            token: RwLock::new(None),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn entity_url(&self, entity_type: &str) -> String {
        self.api_url(&format!("/entity/{}", collection_name(entity_type)))
    }

    /// Get a valid access token, requesting a new one when the cached token expired.
    async fn access_token(&self) -> SgResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.script_name)
            .append_pair("client_secret", &self.api_key)
            .finish();

        let resp = self
            .client
            .post(self.api_url("/auth/access_token"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?;
        let resp = check_status(resp, "authenticate").await?;
        let token: TokenResponse = resp.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        };
        *self.token.write().await = Some(cached);
        tracing::debug!("Obtained access token for script {}", self.script_name);
        Ok(token.access_token)
    }

    async fn request(&self, method: Method, url: &str) -> SgResult<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json"))
    }

    async fn search_page(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: &[&str],
        order: &[Order],
        page: usize,
        page_size: usize,
    ) -> SgResult<Vec<FieldMap>> {
        let mut url = url::Url::parse(&format!("{}/_search", self.entity_url(entity_type)))
            .map_err(|e| SgError::Connection(format!("Invalid site URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            if !fields.is_empty() {
                query.append_pair("fields", &fields.join(","));
            }
            if !order.is_empty() {
                let sort: Vec<String> = order.iter().map(Order::to_sort_param).collect();
                query.append_pair("sort", &sort.join(","));
            }
            query.append_pair("page[size]", &page_size.to_string());
            query.append_pair("page[number]", &page.to_string());
        }

        let body = json!({ "filters": filters });
        let resp = self
            .request(Method::POST, url.as_str())
            .await?
            .header("Content-Type", SEARCH_CONTENT_TYPE)
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp, &format!("find {}", entity_type)).await?;
        let payload: Value = resp.json().await?;

        Ok(payload
            .get("data")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(flatten_record).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Api for RestClient {
    async fn find(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: &[&str],
        limit: usize,
        order: &[Order],
    ) -> SgResult<Vec<FieldMap>> {
        let page_size = if limit > 0 { limit.min(PAGE_SIZE) } else { PAGE_SIZE };
        let mut rows = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .search_page(entity_type, filters, fields, order, page, page_size)
                .await?;
            let exhausted = batch.len() < page_size;
            rows.extend(batch);
            if exhausted || (limit > 0 && rows.len() >= limit) {
                break;
            }
            page += 1;
        }
        if limit > 0 {
            rows.truncate(limit);
        }
        tracing::debug!("find {} returned {} rows", entity_type, rows.len());
        Ok(rows)
    }

    async fn create(&self, entity_type: &str, data: &FieldMap) -> SgResult<FieldMap> {
        let resp = self
            .request(Method::POST, &self.entity_url(entity_type))
            .await?
            .json(&to_value(data))
            .send()
            .await?;
        let resp = check_status(resp, &format!("create {}", entity_type)).await?;
        let payload: Value = resp.json().await?;
        let record = payload
            .get("data")
            .ok_or_else(|| SgError::api(format!("No {} returned from create", entity_type)))?;
        Ok(flatten_record(record))
    }

    async fn update(
        &self,
        entity_type: &str,
        id: i64,
        data: &FieldMap,
        modes: Option<&UpdateModes>,
    ) -> SgResult<FieldMap> {
        let url = format!("{}/{}", self.entity_url(entity_type), id);
        let resp = self
            .request(Method::PUT, &url)
            .await?
            .json(&update_body(data, modes))
            .send()
            .await?;
        let resp = check_status(resp, &format!("update {} {}", entity_type, id)).await?;
        let payload: Value = resp.json().await?;
        Ok(payload.get("data").map(flatten_record).unwrap_or_default())
    }

    async fn delete(&self, entity_type: &str, id: i64) -> SgResult<bool> {
        let url = format!("{}/{}", self.entity_url(entity_type), id);
        let resp = self.request(Method::DELETE, &url).await?.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp, &format!("delete {} {}", entity_type, id)).await?;
        Ok(true)
    }

    async fn revive(&self, entity_type: &str, id: i64) -> SgResult<bool> {
        let url = format!("{}/{}?revive=true", self.entity_url(entity_type), id);
        let resp = self.request(Method::POST, &url).await?.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp, &format!("revive {} {}", entity_type, id)).await?;
        Ok(true)
    }

    async fn upload(
        &self,
        entity_type: &str,
        id: i64,
        path: &Path,
        field_name: &str,
    ) -> SgResult<bool> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SgError::validation(format!("Not a file path: {}", path.display())))?;

        // 1. Ask the site where to put the bytes.
        let mut url = url::Url::parse(&format!(
            "{}/{}/{}/_upload",
            self.entity_url(entity_type),
            id,
            field_name
        ))
        .map_err(|e| SgError::Connection(format!("Invalid site URL: {}", e)))?;
        url.query_pairs_mut().append_pair("filename", &filename);
        let resp = self.request(Method::GET, url.as_str()).await?.send().await?;
        let resp = check_status(resp, "request upload url").await?;
        let info: Value = resp.json().await?;

        let upload_url = info
            .pointer("/links/upload")
            .and_then(Value::as_str)
            .ok_or_else(|| SgError::api("Upload response has no upload link"))?;
        let complete_path = info
            .pointer("/links/complete_upload")
            .and_then(Value::as_str)
            .ok_or_else(|| SgError::api("Upload response has no completion link"))?;

        // 2. Send the file to storage.
        let bytes = tokio::fs::read(path).await?;
        let resp = self.client.put(upload_url).body(bytes).send().await?;
        check_status(resp, "upload file").await?;

        // 3. Link the stored file to the field.
        let complete_url = format!("{}{}", self.base_url, complete_path);
        let body = json!({
            "upload_info": info.get("data").cloned().unwrap_or(Value::Null),
            "upload_data": { "display_name": filename },
        });
        let resp = self
            .request(Method::POST, &complete_url)
            .await?
            .json(&body)
            .send()
            .await?;
        check_status(resp, "complete upload").await?;
        Ok(true)
    }

    async fn batch(&self, requests: &[BatchRequest]) -> SgResult<Vec<Value>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let wire: Vec<Value> = requests.iter().map(batch_wire_request).collect();
        let resp = self
            .request(Method::POST, &self.api_url("/entity/_batch"))
            .await?
            .json(&json!({ "requests": wire }))
            .send()
            .await?;
        let resp = check_status(resp, "batch").await?;
        let payload: Value = resp.json().await?;
        Ok(payload
            .get("data")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| match row {
                        Value::Object(_) => to_value(&flatten_record(row)),
                        other => other.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(&self, url: &str, dest: &Path) -> SgResult<u64> {
        stream_download(&self.client, url, dest, DEFAULT_CHUNK_SIZE).await
    }
}

/// Fail with the response body when the status is not 2xx.
async fn check_status(resp: Response, action: &str) -> SgResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(SgError::api_status(
        status.as_u16(),
        format!("Failed to {}: {}", action, text),
    ))
}

/// REST collection name for an entity type, e.g. `PublishedFile` -> `published_files`.
pub(crate) fn collection_name(entity_type: &str) -> String {
    let mut out = String::with_capacity(entity_type.len() + 4);
    for (i, ch) in entity_type.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out.push('s');
    out
}

/// Flatten a `{type, id, attributes, relationships}` record into one field map.
pub(crate) fn flatten_record(record: &Value) -> FieldMap {
    let mut map = FieldMap::new();
    if let Some(t) = record.get("type") {
        map.insert("type".to_string(), t.clone());
    }
    if let Some(id) = record.get("id") {
        map.insert("id".to_string(), id.clone());
    }
    if let Some(Value::Object(attrs)) = record.get("attributes") {
        for (k, v) in attrs {
            map.insert(k.clone(), v.clone());
        }
    }
    if let Some(Value::Object(rels)) = record.get("relationships") {
        for (k, rel) in rels {
            let data = rel.get("data").cloned().unwrap_or(Value::Null);
            map.insert(k.clone(), strip_links(data));
        }
    }
    map
}

/// Drop `links` noise from relationship payloads.
fn strip_links(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(k, _)| k != "links")
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_links).collect()),
        other => other,
    }
}

/// Update payload; fields with an update mode are sent as
/// `{"multi_entity_update_mode": <mode>, "value": <value>}`.
fn update_body(data: &FieldMap, modes: Option<&UpdateModes>) -> Value {
    let body: Map<String, Value> = data
        .iter()
        .map(|(field, value)| {
            let value = match modes.and_then(|m| m.get(field)) {
                Some(mode) => json!({
                    "multi_entity_update_mode": mode.as_str(),
                    "value": value
                }),
                None => value.clone(),
            };
            (field.clone(), value)
        })
        .collect();
    Value::Object(body)
}

fn batch_wire_request(request: &BatchRequest) -> Value {
    match request {
        BatchRequest::Create { entity_type, data } => json!({
            "request_type": "create",
            "entity": entity_type,
            "data": to_value(data),
        }),
        BatchRequest::Update {
            entity_type,
            entity_id,
            data,
        } => json!({
            "request_type": "update",
            "entity": entity_type,
            "record_id": entity_id,
            "data": to_value(data),
        }),
        BatchRequest::Delete {
            entity_type,
            entity_id,
        } => json!({
            "request_type": "delete",
            "entity": entity_type,
            "record_id": entity_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("Shot"), "shots");
        assert_eq!(collection_name("PublishedFile"), "published_files");
        assert_eq!(collection_name("CustomEntity06"), "custom_entity06s");
    }

    #[test]
    fn test_update_body_wraps_mode_fields() {
        let data = crate::fields::field_map(json!({
            "sg_status_list": "ip",
            "versions": [{"type": "Version", "id": 7}]
        }));
        let mut modes = UpdateModes::new();
        modes.insert("versions".to_string(), crate::api::UpdateMode::Add);
        modes.insert("tags".to_string(), crate::api::UpdateMode::Set);

        assert_eq!(
            update_body(&data, Some(&modes)),
            json!({
                "sg_status_list": "ip",
                "versions": {
                    "multi_entity_update_mode": "add",
                    "value": [{"type": "Version", "id": 7}]
                }
            })
        );
        assert_eq!(update_body(&data, None), to_value(&data));
    }

    #[test]
    fn test_flatten_record() {
        let record = json!({
            "type": "Shot",
            "id": 1161,
            "attributes": {"code": "SH010", "sg_status_list": "ip"},
            "relationships": {
                "project": {
                    "data": {"type": "Project", "id": 70, "name": "Demo", "links": {"self": "/x"}},
                    "links": {"related": "/y"}
                },
                "tags": {"data": [{"type": "Tag", "id": 341}]}
            },
            "links": {"self": "/api/v1/entity/shots/1161"}
        });
        let map = flatten_record(&record);
        assert_eq!(map["type"], json!("Shot"));
        assert_eq!(map["id"], json!(1161));
        assert_eq!(map["code"], json!("SH010"));
        assert_eq!(map["project"], json!({"type": "Project", "id": 70, "name": "Demo"}));
        assert_eq!(map["tags"], json!([{"type": "Tag", "id": 341}]));
        assert!(!map.contains_key("links"));
    }

    #[test]
    fn test_batch_wire_request() {
        let wire = batch_wire_request(&BatchRequest::delete("Version", 9));
        assert_eq!(
            wire,
            json!({"request_type": "delete", "entity": "Version", "record_id": 9})
        );
    }

    #[test]
    fn test_client_urls() {
        let client = RestClient::new(&Config::new("https://site.example.com/", "s", "k")).unwrap();
        assert_eq!(
            client.entity_url("PublishedFile"),
            "https://site.example.com/api/v1/entity/published_files"
        );
    }
}
