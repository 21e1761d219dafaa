//! Loading entities from loosely typed link data.

use serde_json::Value;

use super::{Entity, EntityKind};
use crate::entities::{Project, TypedEntity, Version};
use crate::error::{SgError, SgResult};
use crate::fields::{is_empty_value, FieldMap};

/// Which matches `load_entity` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retrieval {
    First,
    All,
    /// Exactly one match; more is an error
    #[default]
    Unique,
}

/// What `load_entity` does when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Missing {
    /// Return an unsaved proxy built from the input; call `save()` to persist it
    Create,
    Ignore,
    #[default]
    Raise,
}

impl Entity {
    /// Resolve `{type, id?, code?|<key>?}` data into proxies scoped on `self`.
    ///
    /// Data carrying an id is wrapped as-is without a round trip. Otherwise the
    /// natural key (`content` for Task, `name` for Person, `code` elsewhere)
    /// is looked up through the accessor for that type. An empty result means
    /// there was nothing to load, or nothing matched under [`Missing::Ignore`].
    pub async fn load_entity(
        &self,
        entity_data: &Value,
        retrieval: Retrieval,
        missing: Missing,
    ) -> SgResult<Vec<Entity>> {
        if is_empty_value(entity_data) {
            return Ok(Vec::new());
        }
        let map = entity_data.as_object().ok_or_else(|| {
            SgError::Type(format!("Entity data must be an object. Got {}.", entity_data))
        })?;

        let entity_type = map.get("type").and_then(Value::as_str).unwrap_or_default();
        let (kind, key_field) = EntityKind::from_entity_type(entity_type)
            .and_then(|kind| Some((kind, kind.key_field()?)))
            .ok_or_else(|| {
                SgError::validation(format!("Unsupported entity type: {}", entity_type))
            })?;

        let key = ["code", key_field]
            .iter()
            .filter_map(|k| map.get(*k))
            .find(|v| !is_empty_value(v))
            .map(key_string);
        let has_id = map.get("id").is_some_and(|v| !v.is_null());
        if key.is_none() && !has_id {
            return Ok(Vec::new());
        }

        let mut data: FieldMap = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if let Some(key) = &key {
            data.shift_remove("code");
            data.insert(key_field.to_string(), Value::from(key.clone()));
        }

        let Some(key) = key.filter(|_| !has_id) else {
            return Ok(vec![self.session().create_entity(entity_type, Some(self), data)?]);
        };

        let mut found = self.lookup_by_key(kind, &key).await?;
        tracing::debug!("load_entity {} {:?}: {} match(es)", kind, key, found.len());

        if found.is_empty() {
            return match missing {
                Missing::Create => {
                    Ok(vec![self.session().create_entity(entity_type, Some(self), data)?])
                }
                Missing::Ignore => Ok(Vec::new()),
                Missing::Raise => Err(SgError::NotFound(format!(
                    "Entity not found: {} {}",
                    kind, key
                ))),
            };
        }

        match retrieval {
            Retrieval::First => found.truncate(1),
            Retrieval::All => {}
            Retrieval::Unique if found.len() > 1 => {
                return Err(SgError::validation(format!(
                    "More than one entity found for {} {}",
                    kind, key
                )))
            }
            Retrieval::Unique => {}
        }
        Ok(found)
    }

    /// Dispatch a natural-key lookup to the accessor for `kind`.
    async fn lookup_by_key(&self, kind: EntityKind, key: &str) -> SgResult<Vec<Entity>> {
        let code = Some(key);
        let project = self.clone().downcast::<Project>().ok();

        let rows: Vec<Entity> = match (kind, project) {
            (EntityKind::Project, _) => into_entities(self.session().get_projects(code, None).await?),
            (EntityKind::Task, _) => into_entities(self.get_tasks(code, Vec::new(), None).await?),
            (EntityKind::Version, _) => {
                into_entities(self.get_versions(code, Vec::new(), None).await?)
            }
            (EntityKind::PublishedFile, _) => match self.clone().downcast::<Version>() {
                Ok(version) => into_entities(
                    version
                        .get_published_files(code, None, Vec::new(), None)
                        .await?,
                ),
                Err(_) => into_entities(
                    self.published_files(code, None, Vec::new(), None)
                        .await?,
                ),
            },
            (EntityKind::Asset, Some(p)) => into_entities(p.get_assets(code, None).await?),
            (EntityKind::Sequence, Some(p)) => into_entities(p.get_sequences(code, None).await?),
            (EntityKind::Shot, Some(p)) => into_entities(p.get_shots(code, None, None).await?),
            (EntityKind::Playlist, Some(p)) => into_entities(p.get_playlists(code, None).await?),
            (EntityKind::YPackage, Some(p)) => into_entities(p.get_ypackage(code, None).await?),
            (EntityKind::YMedia, Some(p)) => into_entities(p.get_ymedia(code, None).await?),
            (EntityKind::Person, Some(p)) => into_entities(p.get_persons(code, None).await?),
            (EntityKind::Group, Some(p)) => into_entities(p.get_groups(code, None).await?),
            _ => Vec::new(),
        };
        Ok(rows)
    }
}

fn into_entities<T: TypedEntity>(rows: Vec<T>) -> Vec<Entity> {
    rows.into_iter().map(TypedEntity::into_entity).collect()
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
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

    async fn fixture() -> (Arc<InMemoryApi>, Project) {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        (api, project)
    }

    #[tokio::test]
    async fn test_nothing_to_load() {
        let (_api, project) = fixture().await;
        let empty = project
            .load_entity(&Value::Null, Retrieval::Unique, Missing::Raise)
            .await
            .unwrap();
        assert!(empty.is_empty());
        let keyless = project
            .load_entity(&json!({"type": "Shot"}), Retrieval::Unique, Missing::Raise)
            .await
            .unwrap();
        assert!(keyless.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let (_api, project) = fixture().await;
        let err = project
            .load_entity(&json!({"type": "Spaceship", "code": "x"}), Retrieval::Unique, Missing::Raise)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported entity type: Spaceship");
    }

    #[tokio::test]
    async fn test_kinds_without_natural_key_are_not_loadable() {
        let (_api, project) = fixture().await;
        let err = project
            .load_entity(&json!({"type": "Step", "code": "comp"}), Retrieval::Unique, Missing::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, SgError::Validation(_)));
        assert_eq!(err.to_string(), "Unsupported entity type: Step");

        let err = project
            .load_entity(&json!({"type": "Delivery", "id": 4}), Retrieval::Unique, Missing::Create)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported entity type: Delivery");
    }

    #[tokio::test]
    async fn test_id_is_wrapped_without_round_trip() {
        let (api, project) = fixture().await;
        let calls = api.calls().len();
        let loaded = project
            .load_entity(
                &json!({"type": "Task", "id": 5, "code": "comp"}),
                Retrieval::Unique,
                Missing::Raise,
            )
            .await
            .unwrap();
        assert_eq!(api.calls().len(), calls);
        assert_eq!(loaded[0].id(), Some(5));
        assert_eq!(loaded[0].get_str("content"), Some("comp"));
        assert!(loaded[0].get("code").is_none());
        assert_eq!(loaded[0].project(), project.project());
    }

    #[tokio::test]
    async fn test_unique_and_first_retrieval() {
        let (_api, project) = fixture().await;
        project.create_sequence("SQ010", FieldMap::new()).await.unwrap();
        project.create_sequence("SQ010", FieldMap::new()).await.unwrap();

        let data = json!({"type": "Sequence", "code": "SQ010"});
        let err = project
            .load_entity(&data, Retrieval::Unique, Missing::Raise)
            .await
            .unwrap_err();
        assert!(matches!(err, SgError::Validation(_)));

        let first = project.load_entity(&data, Retrieval::First, Missing::Raise).await.unwrap();
        assert_eq!(first.len(), 1);
        let all = project.load_entity(&data, Retrieval::All, Missing::Raise).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_policies() {
        let (api, project) = fixture().await;
        let data = json!({"type": "Asset", "code": "chair"});

        let err = project
            .load_entity(&data, Retrieval::Unique, Missing::Raise)
            .await
            .unwrap_err();
        assert!(matches!(err, SgError::NotFound(_)));

        let ignored = project.load_entity(&data, Retrieval::Unique, Missing::Ignore).await.unwrap();
        assert!(ignored.is_empty());

        let mut created = project
            .load_entity(&data, Retrieval::Unique, Missing::Create)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(created[0].id().is_none());
        assert_eq!(api.count("Asset"), 0);

        created[0].save().await.unwrap();
        assert_eq!(api.count("Asset"), 1);
        let found = project.load_entity(&data, Retrieval::Unique, Missing::Raise).await.unwrap();
        assert_eq!(found[0].id(), created[0].id());
    }

    #[tokio::test]
    async fn test_project_scoped_types_need_a_project() {
        let (_api, project) = fixture().await;
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        let data = json!({"type": "Shot", "code": "SH010"});

        let found = project.load_entity(&data, Retrieval::Unique, Missing::Raise).await.unwrap();
        assert_eq!(found[0].id(), shot.id());

        let from_shot = shot.load_entity(&data, Retrieval::Unique, Missing::Ignore).await.unwrap();
        assert!(from_shot.is_empty());
    }

    #[tokio::test]
    async fn test_task_by_content() {
        let (_api, project) = fixture().await;
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        shot.create_task("comp", None, FieldMap::new()).await.unwrap();

        let tasks = shot
            .load_entity(&json!({"type": "Task", "code": "comp"}), Retrieval::Unique, Missing::Raise)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind(), EntityKind::Task);
    }
}
