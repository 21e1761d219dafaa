use std::sync::Arc;

use serde_json::Value;

use super::{
    entity_wrapper, Asset, Delivery, Group, Person, Playlist, Sequence, Shot, Step, TypedEntity,
    Version, YMedia, YPackage,
};
use crate::cache::Lookup;
use crate::entity::{Entity, EntityKind};
use crate::error::{SgError, SgResult};
use crate::fields::{int_field, FieldMap};
use crate::filters::Filter;

entity_wrapper!(
    /// A production. Root of the project-scoped query path.
    Project => Project
);

/// Fields fetched for the published file type lookup.
const PUBLISHED_FILE_TYPE_FIELDS: &[&str] = &["sg_typegroup", "sg_extensions", "sg_autoupload", "code"];

/// Selects a group by vendor code or by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSelector {
    pub code: Option<String>,
    pub id: Option<i64>,
}

impl GroupSelector {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            id: None,
        }
    }

    pub fn id(id: i64) -> Self {
        Self {
            code: None,
            id: Some(id),
        }
    }

    /// Select by the id carried in a link record.
    pub fn from_data(data: &Value) -> SgResult<Self> {
        let map = data
            .as_object()
            .ok_or_else(|| SgError::Type("data must be a dictionary".to_string()))?;
        Ok(Self {
            code: None,
            id: map.get("id").and_then(Value::as_i64),
        })
    }
}

impl Project {
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// `[project is <self>]` plus an optional `[field is value]`.
    fn scoped(&self, key: Option<(&str, &str)>) -> SgResult<Vec<Filter>> {
        let mut filters = vec![Filter::is("project", self.link()?)];
        if let Some((field, value)) = key {
            filters.push(Filter::is(field, value));
        }
        Ok(filters)
    }

    async fn find_scoped<T: TypedEntity>(
        &self,
        key_field: &str,
        key: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<T>> {
        let filters = self.scoped(key.map(|k| (key_field, k)))?;
        self.find_children(&filters, fields).await
    }

    // ==================== Creators ====================

    pub async fn create_asset(&self, code: &str, mut data: FieldMap) -> SgResult<Asset> {
        data.insert("code".to_string(), code.into());
        self.create_child(data).await
    }

    pub async fn create_delivery(&self, title: &str, mut data: FieldMap) -> SgResult<Delivery> {
        data.insert("title".to_string(), title.into());
        self.create_child(data).await
    }

    /// Create a playlist holding the given (saved) versions.
    pub async fn create_playlist(
        &self,
        code: &str,
        versions: &[Version],
        mut data: FieldMap,
    ) -> SgResult<Playlist> {
        let links: Vec<Value> = versions
            .iter()
            .filter_map(|v| v.to_ref())
            .map(|r| r.to_value())
            .collect();
        data.insert("code".to_string(), code.into());
        data.insert("versions".to_string(), Value::Array(links));
        self.create_child(data).await
    }

    pub async fn create_sequence(&self, code: &str, mut data: FieldMap) -> SgResult<Sequence> {
        data.insert("code".to_string(), code.into());
        self.create_child(data).await
    }

    pub async fn create_shot(
        &self,
        code: &str,
        sequence: Option<&Sequence>,
        mut data: FieldMap,
    ) -> SgResult<Shot> {
        if let Some(sequence) = sequence {
            data.insert("sg_sequence".to_string(), sequence.link()?);
        }
        data.insert("code".to_string(), code.into());
        self.create_child(data).await
    }

    // ==================== Finders ====================

    pub async fn get_assets(&self, code: Option<&str>, fields: Option<&[&str]>) -> SgResult<Vec<Asset>> {
        self.find_scoped("code", code, fields).await
    }

    pub async fn get_deliveries(
        &self,
        title: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Delivery>> {
        self.find_scoped("title", title, fields).await
    }

    pub async fn get_playlists(
        &self,
        code: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Playlist>> {
        self.find_scoped("code", code, fields).await
    }

    pub async fn get_ymedia(&self, code: Option<&str>, fields: Option<&[&str]>) -> SgResult<Vec<YMedia>> {
        self.find_scoped("code", code, fields).await
    }

    pub async fn get_ypackage(
        &self,
        code: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<YPackage>> {
        self.find_scoped("code", code, fields).await
    }

    pub async fn get_sequences(
        &self,
        code: Option<&str>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Sequence>> {
        self.find_scoped("code", code, fields).await
    }

    /// People are site-wide; `name` narrows by display name.
    pub async fn get_persons(&self, name: Option<&str>, fields: Option<&[&str]>) -> SgResult<Vec<Person>> {
        let filters: Vec<Filter> = name.map(|n| Filter::is("name", n)).into_iter().collect();
        self.find_children(&filters, fields).await
    }

    /// Groups are site-wide.
    pub async fn get_groups(&self, code: Option<&str>, fields: Option<&[&str]>) -> SgResult<Vec<Group>> {
        let filters: Vec<Filter> = code.map(|c| Filter::is("code", c)).into_iter().collect();
        self.find_children(&filters, fields).await
    }

    pub async fn get_shots(
        &self,
        code: Option<&str>,
        id: Option<i64>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Shot>> {
        self.find_shots(code, id, fields, 0).await
    }

    /// Shots of this project with an optional result limit (0 means none).
    pub async fn find_shots(
        &self,
        code: Option<&str>,
        id: Option<i64>,
        fields: Option<&[&str]>,
        limit: usize,
    ) -> SgResult<Vec<Shot>> {
        let rows = self
            .get_entities(
                EntityKind::Shot.entity_type(),
                code,
                id,
                self.scoped(None)?,
                fields,
                limit,
            )
            .await?;
        Ok(rows.into_iter().map(Shot::wrap).collect())
    }

    /// The single shot matching code and/or id.
    ///
    /// # Errors
    ///
    /// Returns `SgError::Validation` if more than one shot matches.
    pub async fn get_shot(
        &self,
        code: Option<&str>,
        id: Option<i64>,
        fields: Option<&[&str]>,
    ) -> SgResult<Option<Shot>> {
        let shot = self
            .get_entity(EntityKind::Shot.entity_type(), code, id, self.scoped(None)?, fields)
            .await?;
        Ok(shot.map(Shot::wrap))
    }

    /// Pipeline steps, optionally narrowed by short name.
    pub async fn get_steps(
        &self,
        short_name: Option<&str>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<Step>> {
        let mut params: Vec<Filter> = short_name
            .map(|s| Filter::is("short_name", s))
            .into_iter()
            .collect();
        params.extend(filters);
        self.find_children(&params, fields).await
    }

    // ==================== Lookups ====================

    /// Resolve a group through the vendor-code lookup.
    ///
    /// # Errors
    ///
    /// Returns `SgError::Validation` if both a code and an id are given.
    pub async fn get_group(&self, selector: GroupSelector) -> SgResult<Option<Group>> {
        let (code, id) = match selector {
            GroupSelector {
                code: Some(_),
                id: Some(_),
            } => return Err(SgError::validation("Specify either code or id, not both.")),
            GroupSelector { code, id } => (code, id),
        };

        let lookup = self.get_group_lookup().await?;
        let found = match code {
            Some(code) => lookup.get(&code),
            None => lookup.values().find(|g| int_field(g, "id") == id),
        };
        Ok(found.map(|data| {
            Group::wrap(Entity::new(
                self.session().clone(),
                EntityKind::Group,
                data.clone(),
                Some(self),
            ))
        }))
    }

    /// Groups keyed by `sg_vendor_code`.
    pub async fn get_group_lookup(&self) -> SgResult<Arc<Lookup>> {
        self.session()
            .get_lookup(
                EntityKind::Group.entity_type(),
                "sg_vendor_code",
                Some(EntityKind::Group.fields()),
                None,
            )
            .await
    }

    /// Published file types keyed by each of their comma-separated extensions.
    pub async fn get_published_file_type_lookup(&self) -> SgResult<Arc<Lookup>> {
        self.session()
            .get_lookup(
                "PublishedFileType",
                "sg_extensions",
                Some(PUBLISHED_FILE_TYPE_FIELDS),
                Some(","),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::config::Config;
    use crate::session::Session;
    use serde_json::json;

    async fn fixture() -> (Arc<InMemoryApi>, Project) {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        (api, project)
    }

    #[tokio::test]
    async fn test_create_shot_in_sequence() {
        let (api, project) = fixture().await;
        let seq = project.create_sequence("SQ010", FieldMap::new()).await.unwrap();
        let shot = project.create_shot("SQ010_0010", Some(&seq), FieldMap::new()).await.unwrap();

        let stored = api.record("Shot", shot.id().unwrap()).unwrap();
        assert_eq!(stored["sg_sequence"], json!({"type": "Sequence", "id": seq.id().unwrap()}));
        assert_eq!(stored["project"]["id"], json!(project.id().unwrap()));
        assert_eq!(shot.parent().unwrap().id, project.id());

        let shots = project.get_shots(Some("SQ010_0010"), None, None).await.unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(seq.get_shots(None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finders_are_project_scoped() {
        let (api, project) = fixture().await;
        project.create_asset("chair", FieldMap::new()).await.unwrap();
        api.insert("Asset", json!({"code": "chair", "project": {"type": "Project", "id": 999}}));

        assert_eq!(project.get_assets(Some("chair"), None).await.unwrap().len(), 1);
        assert_eq!(project.get_assets(None, None).await.unwrap().len(), 1);

        api.insert("Person", json!({"name": "Ada"}));
        assert_eq!(project.get_persons(Some("Ada"), None).await.unwrap().len(), 1);
        assert!(api.last_call("find").unwrap().filters.iter().all(|f| f.field != "project"));
    }

    #[tokio::test]
    async fn test_find_and_get_shot() {
        let (_api, project) = fixture().await;
        for code in ["SH010", "SH020", "SH030"] {
            project.create_shot(code, None, FieldMap::new()).await.unwrap();
        }
        assert_eq!(project.find_shots(None, None, None, 2).await.unwrap().len(), 2);
        let shot = project.get_shot(Some("SH020"), None, None).await.unwrap().unwrap();
        assert_eq!(shot.code(), Some("SH020"));
        assert!(project.get_shot(None, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_create_playlist_links_versions() {
        let (api, project) = fixture().await;
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        let v1 = shot.create_version("SH010_v001", None, FieldMap::new()).await.unwrap();
        let v2 = shot.create_version("SH010_v002", None, FieldMap::new()).await.unwrap();

        let playlist = project
            .create_playlist("dailies", &[v1.clone(), v2.clone()], FieldMap::new())
            .await
            .unwrap();
        let stored = api.record("Playlist", playlist.id().unwrap()).unwrap();
        assert_eq!(
            stored["versions"],
            json!([{"type": "Version", "id": v1.id().unwrap()}, {"type": "Version", "id": v2.id().unwrap()}])
        );
        assert_eq!(playlist.versions().len(), 2);
    }

    #[tokio::test]
    async fn test_get_group() {
        let (api, project) = fixture().await;
        let group = api.insert("Group", json!({"code": "Vendor A", "sg_vendor_code": "VNA"}));

        let by_code = project.get_group(GroupSelector::code("VNA")).await.unwrap().unwrap();
        assert_eq!(by_code.code(), Some("Vendor A"));

        let id = group["id"].as_i64().unwrap();
        let by_id = project.get_group(GroupSelector::id(id)).await.unwrap().unwrap();
        assert_eq!(by_id.id(), Some(id));

        let both = GroupSelector {
            code: Some("VNA".to_string()),
            id: Some(id),
        };
        assert!(matches!(project.get_group(both).await, Err(SgError::Validation(_))));
        assert!(matches!(GroupSelector::from_data(&json!(3)), Err(SgError::Type(_))));
    }

    #[tokio::test]
    async fn test_published_file_type_lookup() {
        let (api, project) = fixture().await;
        api.insert("PublishedFileType", json!({"code": "Image", "sg_extensions": "exr, dpx"}));
        api.insert("PublishedFileType", json!({"code": "Movie", "sg_extensions": "mov"}));
        api.insert("PublishedFileType", json!({"code": "Unknown", "sg_extensions": ""}));

        let lookup = project.get_published_file_type_lookup().await.unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup["dpx"]["code"], json!("Image"));
        assert_eq!(lookup["mov"]["code"], json!("Movie"));
    }
}
