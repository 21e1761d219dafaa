use super::{entity_wrapper, Task};
use crate::error::{SgError, SgResult};
use crate::fields::{EntityRef, FieldMap};
use crate::filters::Filter;
use crate::media::Movie;

entity_wrapper!(
    /// A reviewable iteration of work, optionally carrying an uploaded movie.
    Version => Version
);

entity_wrapper!(
    /// A file published from a version.
    PublishedFile => PublishedFile
);

impl Version {
    /// The `sg_uploaded_movie` attachment.
    pub fn movie(&self) -> Movie {
        let data = self.get("sg_uploaded_movie").cloned().unwrap_or_default();
        Movie::new(self.session().clone(), data, self.to_ref())
    }

    pub fn path_to_frames(&self) -> Option<&str> {
        self.get_str("sg_path_to_frames")
    }

    pub fn version_type(&self) -> Option<&str> {
        self.get_str("sg_version_type")
    }

    /// The shot or asset this version belongs to.
    pub fn entity(&self) -> Option<EntityRef> {
        self.get("entity").and_then(EntityRef::from_value)
    }

    pub fn task(&self) -> Option<EntityRef> {
        self.get("sg_task").and_then(EntityRef::from_value)
    }

    /// Publish a file from this version under the same shot or asset.
    pub async fn create_published_file(
        &self,
        code: &str,
        task: Option<&Task>,
        mut data: FieldMap,
    ) -> SgResult<PublishedFile> {
        let owner = self
            .parent()
            .and_then(|p| p.to_ref())
            .filter(|r| r.entity_type != "Project")
            .or_else(|| self.entity())
            .ok_or_else(|| {
                SgError::validation(format!("{} is not linked to a shot or asset", self.uname_id()))
            })?;

        data.insert("code".to_string(), code.into());
        data.insert("entity".to_string(), owner.to_value());
        data.insert("version".to_string(), self.link()?);
        if let Some(task) = task {
            data.insert("task".to_string(), task.link()?);
        }
        self.create_child(data).await
    }

    /// Published files whose `version` is this version.
    pub async fn get_published_files(
        &self,
        code: Option<&str>,
        id: Option<i64>,
        filters: Vec<Filter>,
        fields: Option<&[&str]>,
    ) -> SgResult<Vec<PublishedFile>> {
        let mut params = vec![Filter::is("version", self.link()?)];
        params.extend(filters);
        self.published_files(code, id, params, fields).await
    }
}

impl PublishedFile {
    pub fn version_number(&self) -> Option<i64> {
        self.get("version_number").and_then(|v| v.as_i64())
    }

    pub fn published_file_type(&self) -> Option<EntityRef> {
        self.get("published_file_type").and_then(EntityRef::from_value)
    }

    pub fn version(&self) -> Option<EntityRef> {
        self.get("version").and_then(EntityRef::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::config::Config;
    use crate::session::Session;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_from_version() {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        let task = shot.create_task("comp", None, FieldMap::new()).await.unwrap();
        let version = shot
            .create_version("SH010_comp_v001", Some(&task), FieldMap::new())
            .await
            .unwrap();

        let mut data = FieldMap::new();
        data.insert("version_number".to_string(), json!(1));
        let published = version
            .create_published_file("SH010_comp_v001.exr", Some(&task), data)
            .await
            .unwrap();

        let stored = api.record("PublishedFile", published.id().unwrap()).unwrap();
        assert_eq!(stored["entity"], json!({"type": "Shot", "id": shot.id().unwrap()}));
        assert_eq!(stored["version"], json!({"type": "Version", "id": version.id().unwrap()}));
        assert_eq!(stored["task"], json!({"type": "Task", "id": task.id().unwrap()}));
        assert_eq!(published.version_number(), Some(1));

        let found = version.get_published_files(None, None, vec![], None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version().map(|v| v.id), version.id());
        assert!(version
            .get_published_files(Some("other.exr"), None, vec![], None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_version_loaded_under_project_uses_entity_link() {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        shot.create_version("SH010_v001", None, FieldMap::new()).await.unwrap();

        let version = project
            .get_entity("Version", Some("SH010_v001"), None, vec![], None)
            .await
            .unwrap()
            .unwrap()
            .downcast::<Version>()
            .unwrap();
        let published = version
            .create_published_file("SH010_v001.mov", None, FieldMap::new())
            .await
            .unwrap();
        let stored = api.record("PublishedFile", published.id().unwrap()).unwrap();
        assert_eq!(stored["entity"]["id"], json!(shot.id().unwrap()));
    }
}
