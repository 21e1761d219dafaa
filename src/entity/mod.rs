//! Generic entity proxy.
//!
//! An [`Entity`] wraps a kind tag and the field map last returned by the
//! service. It reaches the remote client through its [`Session`] handle and
//! remembers where it was reached from through a non-owning [`ParentLink`].
//!
//! ## Query path
//!
//! ```text
//! Session
//!   `- Project
//!        |- Sequence
//!        |    `- Shot
//!        |         |- Version
//!        |         |    |- PublishedFile
//!        |         |    `- Movie
//!        |         `- Task
//!        `- Asset
//! ```
//!
//! The tree is a navigation convenience only: each child proxy records its
//! parent's `(type, id)` and the project context, never the parent itself.

mod kind;
mod load;

pub use kind::{EntityKind, KindInfo};
pub use load::{Missing, Retrieval};

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::api::{UpdateMode, UpdateModes};
use crate::entities::{PublishedFile, Task, TypedEntity, Version};
use crate::error::{log_connection, SgError, SgResult};
use crate::fields::{int_field, is_empty_value, str_field, EntityRef, FieldMap};
use crate::filters::{Filter, Order};
use crate::helpers::{self, KeyMode};
use crate::session::Session;
use crate::tags::{self, TagRef};

/// Keys the service assigns; never sent on create/update.
const PROTECTED_KEYS: &[&str] = &["id", "type"];

/// Fields kept by [`Entity::data_id`].
const DATA_ID_FIELDS: &[&str] = &["id", "code", "name", "content", "type"];

/// Where an entity was reached from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentLink {
    pub entity_type: String,
    pub id: Option<i64>,
    /// Project context resolved through the parent
    pub project: Option<EntityRef>,
}

impl ParentLink {
    pub fn of(parent: &Entity) -> Self {
        Self {
            entity_type: parent.entity_type().to_string(),
            id: parent.id(),
            project: parent.project(),
        }
    }

    pub fn to_ref(&self) -> Option<EntityRef> {
        self.id.map(|id| EntityRef::new(self.entity_type.clone(), id))
    }
}

/// Proxy for one remote entity.
#[derive(Debug, Clone)]
pub struct Entity {
    session: Session,
    kind: EntityKind,
    data: FieldMap,
    parent: Option<ParentLink>,
    snapshot: Option<FieldMap>,
}

impl Entity {
    pub fn new(session: Session, kind: EntityKind, data: FieldMap, parent: Option<&Entity>) -> Self {
        Self::with_link(session, kind, data, parent.map(ParentLink::of))
    }

    pub fn with_link(
        session: Session,
        kind: EntityKind,
        data: FieldMap,
        parent: Option<ParentLink>,
    ) -> Self {
        Self {
            session,
            kind,
            data,
            parent,
            snapshot: None,
        }
    }

    // ==================== Accessors ====================

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Remote entity type string.
    pub fn entity_type(&self) -> &'static str {
        self.kind.entity_type()
    }

    pub fn id(&self) -> Option<i64> {
        int_field(&self.data, "id")
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Root handle owning the remote client.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn data(&self) -> &FieldMap {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FieldMap {
        &mut self.data
    }

    /// Raw field value; null counts as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        str_field(&self.data, field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(field.into(), value.into());
    }

    pub fn code(&self) -> Option<&str> {
        self.get_str("code")
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.set("code", code.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.get_str("description")
    }

    pub fn status(&self) -> Option<&str> {
        self.get_str("sg_status_list")
    }

    /// Display name: the code, else the name.
    pub fn uname(&self) -> Option<&str> {
        self.code()
            .filter(|c| !c.is_empty())
            .or_else(|| self.get_str("name"))
    }

    /// `"<uname> (<id>)"`
    pub fn uname_id(&self) -> String {
        format!("{} ({})", display_opt(self.uname()), display_opt(self.id()))
    }

    /// Minimal non-empty subset of `{id, code, name, content, type}`, usable in filters.
    pub fn data_id(&self) -> FieldMap {
        let mut out = FieldMap::new();
        for key in DATA_ID_FIELDS {
            if let Some(value) = self.data.get(*key).filter(|v| !is_empty_value(v)) {
                out.insert(key.to_string(), value.clone());
            }
        }
        out
    }

    pub fn to_ref(&self) -> Option<EntityRef> {
        let id = self.id()?;
        let mut link = EntityRef::new(self.entity_type(), id);
        link.name = self.uname().map(str::to_string);
        Some(link)
    }

    /// Link value for filters; the entity must have been saved.
    pub(crate) fn link(&self) -> SgResult<Value> {
        self.to_ref().map(|r| r.to_value()).ok_or_else(|| {
            SgError::validation(format!("{} has no id; save it first", self.kind))
        })
    }

    /// The project this entity belongs to.
    ///
    /// A project is its own context; otherwise the context inherited from the
    /// parent wins, falling back to the `project` link field.
    pub fn project(&self) -> Option<EntityRef> {
        if self.kind == EntityKind::Project {
            return self.to_ref();
        }
        self.parent
            .as_ref()
            .and_then(|p| p.project.clone())
            .or_else(|| self.data.get("project").and_then(EntityRef::from_value))
    }

    /// Convert into a typed wrapper when the kind matches.
    pub fn downcast<T: TypedEntity>(self) -> Result<T, Entity> {
        if self.kind == T::KIND {
            Ok(T::wrap(self))
        } else {
            Err(self)
        }
    }

    // ==================== Tags ====================

    /// Tag ids, unique and in remote order.
    pub fn tags(&self) -> Vec<i64> {
        tags::tag_ids(self.data.get("tags"))
    }

    pub fn set_tags(&mut self, ids: &BTreeSet<i64>) {
        self.set("tags", tags::tag_list(ids.iter().copied()));
    }

    /// Set tags from a loosely typed id list; anything but integers is a type error.
    pub fn set_tags_value(&mut self, value: &Value) -> SgResult<()> {
        let ids = tags::parse_tag_set(value)?;
        self.set_tags(&ids);
        Ok(())
    }

    fn auto_tag(&self) -> Option<TagRef> {
        self.session.auto_tag()
    }

    // ==================== Create / update / delete ====================

    /// Marshal fields for a create call: strip service keys, add the project
    /// context and the pipeline tag.
    fn creation_payload(&self, entity_type: &str, mut data: FieldMap) -> SgResult<FieldMap> {
        helpers::remove_keys_in_place(&mut data, PROTECTED_KEYS, KeyMode::Remove, false);
        if entity_type != EntityKind::Project.entity_type() {
            let project = self.project().ok_or_else(|| {
                SgError::validation(format!("{} has no project context", self.kind))
            })?;
            data.insert("project".to_string(), project.to_value());
        }
        if let Some(tag) = self.auto_tag() {
            data.insert("tags".to_string(), Value::Array(vec![tag.to_value()]));
        }
        Ok(data)
    }

    /// Create this entity remotely and replace local state with the response.
    ///
    /// # Errors
    ///
    /// Returns `SgError::Validation` if the entity already has an id.
    pub async fn save(&mut self) -> SgResult<()> {
        if self.id().is_some() {
            return Err(SgError::validation(
                "Cannot save entity with id, use update() instead.",
            ));
        }
        let data = self.creation_payload(self.entity_type(), self.data.clone())?;
        let result = log_connection(
            self.session.api().create(self.entity_type(), &data).await,
            "save",
        )?;
        tracing::debug!("Created {} {:?}", self.kind, int_field(&result, "id"));
        self.data = result;
        Ok(())
    }

    /// Create a new entity of `entity_type` in this entity's project context.
    pub async fn create(&self, entity_type: &str, data: FieldMap) -> SgResult<FieldMap> {
        let data = self.creation_payload(entity_type, data)?;
        log_connection(
            self.session.api().create(entity_type, &data).await,
            "create",
        )
    }

    /// Create a typed child in this entity's project context.
    pub(crate) async fn create_child<T: TypedEntity>(&self, data: FieldMap) -> SgResult<T> {
        let result = self.create(T::KIND.entity_type(), data).await?;
        Ok(T::wrap(Entity::new(
            self.session.clone(),
            T::KIND,
            result,
            Some(self),
        )))
    }

    /// Update remote fields and merge the echoed result into local state.
    ///
    /// The pipeline tag is always re-applied with `set` semantics, replacing
    /// any tags passed by the caller. Empty `fields` return the current data
    /// without a round trip.
    pub async fn update(
        &mut self,
        modes: Option<UpdateModes>,
        mut fields: FieldMap,
    ) -> SgResult<FieldMap> {
        if fields.is_empty() {
            return Ok(self.data.clone());
        }
        let id = self.id().ok_or_else(|| {
            SgError::validation("Cannot update entity without id, use save() instead.")
        })?;

        let mut modes = modes;
        if let Some(tag) = self.auto_tag() {
            fields.insert("tags".to_string(), Value::Array(vec![tag.to_value()]));
            modes
                .get_or_insert_with(UpdateModes::new)
                .insert("tags".to_string(), UpdateMode::Set);
        }
        helpers::remove_keys_in_place(&mut fields, PROTECTED_KEYS, KeyMode::Remove, false);

        let result = log_connection(
            self.session
                .api()
                .update(self.entity_type(), id, &fields, modes.as_ref())
                .await,
            "update",
        )?;
        for (k, v) in &result {
            self.data.insert(k.clone(), v.clone());
        }
        Ok(result)
    }

    /// Re-read this entity by id, replacing local data wholesale.
    ///
    /// Unsaved local changes are lost.
    pub async fn refetch(&mut self, fields: Option<&[&str]>) -> SgResult<()> {
        let id = self
            .id()
            .ok_or_else(|| SgError::validation(format!("{} has no id to refetch", self.kind)))?;
        let fields = fields.unwrap_or(self.kind.fields());
        let rows = log_connection(
            self.session
                .api()
                .find(self.entity_type(), &[Filter::is("id", id)], fields, 1, &[])
                .await,
            "refetch",
        )?;
        self.data = rows
            .into_iter()
            .next()
            .ok_or_else(|| SgError::NotFound(format!("{} with id {}", self.kind, id)))?;
        Ok(())
    }

    /// Retire this entity.
    pub async fn delete(&self) -> SgResult<bool> {
        let id = self
            .id()
            .ok_or_else(|| SgError::validation(format!("{} has no id to delete", self.kind)))?;
        log_connection(
            self.session.api().delete(self.entity_type(), id).await,
            "delete",
        )
    }

    /// Restore this entity after `delete`.
    pub async fn undelete(&self) -> SgResult<bool> {
        let id = self
            .id()
            .ok_or_else(|| SgError::validation(format!("{} has no id to revive", self.kind)))?;
        log_connection(
            self.session.api().revive(self.entity_type(), id).await,
            "undelete",
        )
    }

    // ==================== Child queries ====================

    /// Query `kind` and wrap every row with this entity as parent.
    pub(crate) async fn find_kind(
        &self,
        kind: EntityKind,
        filters: &[Filter],
        fields: Option<&[&str]>,
        limit: usize,
        order: &[Order],
    ) -> SgResult<Vec<Entity>> {
        let fields = fields.unwrap_or(kind.fields());
        let rows = log_connection(
            self.session
                .api()
                .find(kind.entity_type(), filters, fields, limit, order)
                .await,
            &format!("find {}", kind),
        )?;
        let link = ParentLink::of(self);
        Ok(rows
            .into_iter()
            .map(|row| Entity::with_link(self.session.clone(), kind, row, Some(link.clone())))
            .collect())
    }

    pub(crate) async fn find_children<T: TypedEntity>(
        &self,
        filters: &[Filter],
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<T>> {
        let rows = self.find_kind(T::KIND, filters, fields, 0, &[]).await?;
        Ok(rows.into_iter().map(T::wrap).collect())
    }

    /// Tasks linked to this entity (or to this pipeline step).
    pub async fn get_tasks(
        &self,
        content: Option<&str>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Task>> {
        let link_field = if self.kind == EntityKind::Step { "step" } else { "entity" };
        let mut params = vec![Filter::is(link_field, self.link()?)];
        if let Some(content) = content {
            params.push(Filter::is("content", content));
        }
        params.extend(filters);
        self.find_children(&params, fields).await
    }

    /// Versions linked to this entity (or made by tasks of this pipeline step).
    pub async fn get_versions(
        &self,
        code: Option<&str>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Version>> {
        let link_field = if self.kind == EntityKind::Step {
            "sg_task.Task.step"
        } else {
            "entity"
        };
        let mut params = vec![Filter::is(link_field, self.link()?)];
        if let Some(code) = code.filter(|c| !c.is_empty()) {
            params.push(Filter::is("code", code));
        }
        params.extend(filters);
        self.find_children(&params, fields).await
    }

    /// Highest `v<digits>` among the three most recently created versions, 0 if none.
    pub async fn get_latest_version_number(&self) -> SgResult<u64> {
        let link_field = if self.kind == EntityKind::Task { "sg_task" } else { "entity" };
        let rows = log_connection(
            self.session
                .api()
                .find(
                    EntityKind::Version.entity_type(),
                    &[Filter::is(link_field, self.link()?)],
                    &["code"],
                    3,
                    &[Order::desc("created_at")],
                )
                .await,
            "latest version",
        )?;
        let codes = rows.iter().filter_map(|r| str_field(r, "code"));
        Ok(helpers::get_highest_version(codes).unwrap_or(0))
    }

    /// Published files matching optional code/id plus extra filters.
    pub(crate) async fn published_files(
        &self,
        code: Option<&str>,
        id: Option<i64>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<PublishedFile>> {
        let rows = self
            .get_entities(EntityKind::PublishedFile.entity_type(), code, id, filters, fields, 0)
            .await?;
        Ok(rows.into_iter().map(PublishedFile::wrap).collect())
    }

    /// Entities of `entity_type` matching optional code/id plus extra filters.
    pub async fn get_entities(
        &self,
        entity_type: &str,
        code: Option<&str>,
        id: Option<i64>,
        mut filters: Vec<Filter>,
        fields: Option<&[&str]>,
        limit: usize,
    ) -> SgResult<Vec<Entity>> {
        let kind = EntityKind::from_entity_type(entity_type).ok_or_else(|| {
            SgError::validation(format!("Unsupported entity type: {}", entity_type))
        })?;
        if let Some(code) = code {
            filters.push(Filter::is("code", code));
        }
        if let Some(id) = id {
            filters.push(Filter::is("id", id));
        }
        self.find_kind(kind, &filters, fields, limit, &[]).await
    }

    /// The single entity matching, `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `SgError::Validation` if more than one entity matches.
    pub async fn get_entity(
        &self,
        entity_type: &str,
        code: Option<&str>,
        id: Option<i64>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Option<Entity>> {
        let mut rows = self
            .get_entities(entity_type, code, id, filters, fields, 2)
            .await?;
        if rows.len() > 1 {
            return Err(SgError::validation(format!(
                "Multiple {} found with code {}",
                entity_type,
                display_opt(code)
            )));
        }
        Ok(rows.pop())
    }

    // ==================== Change tracking ====================

    /// Remember the current data for a later [`diff`](Self::diff).
    pub fn snapshot(&mut self) -> &mut Self {
        self.snapshot = Some(self.data.clone());
        self
    }

    /// Fields new or changed since the last snapshot; all data when none was taken.
    pub fn diff(&self) -> FieldMap {
        match &self.snapshot {
            Some(before) => helpers::dict_diff(before, &self.data),
            None => self.data.clone(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.diff().is_empty()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} \"{}\" ({})>",
            self.kind.name(),
            display_opt(self.uname()),
            display_opt(self.id())
        )
    }
}

fn display_opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}
