//! Root handle: owns the remote client, configuration and lookup cache.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::api::{Api, BatchRequest, RestClient};
use crate::cache::{Lookup, LookupCache, LookupKey};
use crate::config::Config;
use crate::entities::{Project, TypedEntity};
use crate::entity::{Entity, EntityKind, ParentLink};
use crate::error::{log_connection, SgError, SgResult};
use crate::fields::{is_empty_value, EntityRef, FieldMap};
use crate::filters::{Filter, TimeUnit};
use crate::helpers;
use crate::tags::TagRef;

/// Fields fetched for entities about to be retired.
const RETIRE_FIELDS: &[&str] = &["name", "code", "content"];

struct SessionInner {
    api: Arc<dyn Api>,
    config: Config,
    lookups: LookupCache,
}

/// Cheaply clonable handle shared by every entity proxy.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.config.base_url)
            .field("script_name", &self.inner.config.script_name)
            .finish()
    }
}

impl Session {
    pub fn new(api: Arc<dyn Api>, config: Config) -> Self {
        let lookups = LookupCache::new(&config.lookup_cache);
        Self {
            inner: Arc::new(SessionInner {
                api,
                config,
                lookups,
            }),
        }
    }

    /// Connect to the site's REST API.
    pub fn connect(config: Config) -> SgResult<Self> {
        let client = RestClient::new(&config)?;
        tracing::info!(
            "Connecting to {} as {}",
            config.base_url,
            config.script_name
        );
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn api(&self) -> &dyn Api {
        self.inner.api.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Tag applied to everything created or updated, if configured.
    pub fn auto_tag(&self) -> Option<TagRef> {
        self.inner.config.auto_tag_id.map(TagRef::new)
    }

    /// Create a project named `name`.
    pub async fn create_project(&self, name: &str, mut data: FieldMap) -> SgResult<Project> {
        data.shift_remove("id");
        data.shift_remove("type");
        data.insert("name".to_string(), name.into());
        if let Some(tag) = self.auto_tag() {
            data.insert("tags".to_string(), Value::Array(vec![tag.to_value()]));
        }
        let result = log_connection(
            self.api().create(EntityKind::Project.entity_type(), &data).await,
            "create project",
        )?;
        tracing::info!("Created project {}", name);
        Ok(Project::wrap(Entity::new(
            self.clone(),
            EntityKind::Project,
            result,
            None,
        )))
    }

    /// Query any registered entity type and wrap the rows.
    ///
    /// # Errors
    ///
    /// Returns `SgError::Validation` for an unregistered entity type.
    pub async fn find_entities(
        &self,
        entity_type: &str,
        filters: &[Filter],
        fields: Option<&[&str]>,
        limit: usize,
    ) -> SgResult<Vec<Entity>> {
        let kind = registered(entity_type)?;
        let fields = fields.unwrap_or(kind.fields());
        let rows = log_connection(
            self.api().find(entity_type, filters, fields, limit, &[]).await,
            "find entities",
        )?;
        tracing::debug!("find_entities {}: {} row(s)", entity_type, rows.len());
        Ok(rows
            .into_iter()
            .map(|row| Entity::new(self.clone(), kind, row, None))
            .collect())
    }

    /// Projects, optionally narrowed by name.
    pub async fn get_projects(
        &self,
        name: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Project>> {
        let filters: Vec<Filter> = name
            .filter(|n| !n.is_empty())
            .map(|n| Filter::is("name", n))
            .into_iter()
            .collect();
        let rows = self
            .find_entities(EntityKind::Project.entity_type(), &filters, fields, 0)
            .await?;
        Ok(rows.into_iter().map(Project::wrap).collect())
    }

    /// Batch-delete entities carrying the pipeline tag that were created in
    /// the last `hours` in one project. Returns the number of deletes sent.
    pub async fn retire_recent_entities(
        &self,
        entity_types: &[&str],
        project_id: i64,
        hours: u32,
    ) -> SgResult<usize> {
        if entity_types.is_empty() {
            return Err(SgError::validation("entity_types must not be empty"));
        }
        if project_id <= 0 {
            return Err(SgError::validation("project_id must be a positive id"));
        }
        let tag = self.auto_tag().ok_or_else(|| {
            SgError::validation("retiring entities requires a configured auto tag")
        })?;

        let mut filters = vec![
            Filter::is("project", EntityRef::new("Project", project_id).to_value()),
            Filter::in_last("created_at", hours, TimeUnit::Hour),
            Filter::is("tags", tag.to_value()),
        ];
        if let Some(user) = &self.inner.config.retire_created_by {
            filters.push(Filter::is("created_by", user.to_value()));
        }

        let mut requests = Vec::new();
        for entity_type in entity_types {
            let rows = log_connection(
                self.api()
                    .find(entity_type, &filters, RETIRE_FIELDS, 0, &[])
                    .await,
                "retire",
            )?;
            for row in rows {
                let Some(link) = EntityRef::from_map(&row) else {
                    continue;
                };
                tracing::debug!("Retiring {} {} {:?}", link.entity_type, link.id, link.name);
                requests.push(BatchRequest::delete(link.entity_type, link.id));
            }
        }

        tracing::info!(
            "Retiring {} entities of type {:?} created in the last {} hours",
            requests.len(),
            entity_types,
            hours
        );
        if !requests.is_empty() {
            log_connection(self.api().batch(&requests).await, "retire")?;
        }
        Ok(requests.len())
    }

    /// Records of `entity_type` keyed by `key_field`, memoized per query.
    ///
    /// With a `separator`, each record is keyed by every part of its key value.
    /// Results stay cached until evicted, expired or [`invalidate_lookups`]
    /// is called.
    ///
    /// [`invalidate_lookups`]: Self::invalidate_lookups
    pub async fn get_lookup(
        &self,
        entity_type: &str,
        key_field: &str,
        fields: Option<&[&str]>,
        separator: Option<&str>,
    ) -> SgResult<Arc<Lookup>> {
        let mut query_fields: Vec<&str> = fields.unwrap_or_default().to_vec();
        if !query_fields.contains(&key_field) {
            query_fields.push(key_field);
        }

        let cache_key = LookupKey {
            entity_type: entity_type.to_string(),
            key_field: key_field.to_string(),
            fields: query_fields.iter().map(|f| f.to_string()).collect(),
            separator: separator.map(str::to_string),
        };
        if let Some(hit) = self.inner.lookups.get(&cache_key) {
            return Ok(hit);
        }

        let rows = log_connection(
            self.api()
                .find(
                    entity_type,
                    &[Filter::is_not(key_field, "")],
                    &query_fields,
                    0,
                    &[],
                )
                .await,
            "lookup",
        )?;
        let lookup = Arc::new(helpers::list_of_dicts_to_dict(&rows, key_field, separator)?);
        tracing::debug!(
            "Cached {} lookup by {} ({} keys)",
            entity_type,
            key_field,
            lookup.len()
        );
        self.inner.lookups.insert(cache_key, lookup.clone());
        Ok(lookup)
    }

    /// Drop every memoized lookup.
    pub fn invalidate_lookups(&self) {
        self.inner.lookups.clear();
    }

    /// Build an unsaved proxy of `entity_type` without a round trip.
    pub fn create_entity(
        &self,
        entity_type: &str,
        parent: Option<&Entity>,
        data: FieldMap,
    ) -> SgResult<Entity> {
        let kind = registered(entity_type)?;
        Ok(Entity::with_link(
            self.clone(),
            kind,
            data,
            parent.map(ParentLink::of),
        ))
    }

    pub fn has_id(entity: Option<&Entity>) -> bool {
        entity.is_some_and(|e| e.id().is_some())
    }

    /// Minimal identifying data: link records with an id pass through,
    /// entities are reduced to [`Entity::data_id`].
    pub fn data_id(value: &Value) -> Option<FieldMap> {
        let map = value.as_object()?;
        map.get("id")
            .filter(|id| !is_empty_value(id))
            .map(|_| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// [`data_id`](Self::data_id) for a proxy.
    pub fn entity_data_id(entity: &Entity) -> Option<FieldMap> {
        entity.id().map(|_| entity.data_id())
    }
}

fn registered(entity_type: &str) -> SgResult<EntityKind> {
    EntityKind::from_entity_type(entity_type)
        .ok_or_else(|| SgError::validation(format!("Unsupported entity type: {}", entity_type)))
}
