use serde_json::Value;

use super::{entity_wrapper, Version};
use crate::api::{UpdateMode, UpdateModes};
use crate::error::SgResult;
use crate::fields::{EntityRef, FieldMap};

entity_wrapper!(
    /// An ordered review list of versions.
    Playlist => Playlist
);

entity_wrapper!(
    /// An outgoing or incoming delivery.
    Delivery => Delivery
);

impl Playlist {
    pub fn versions(&self) -> Vec<EntityRef> {
        self.get("versions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(EntityRef::from_value).collect())
            .unwrap_or_default()
    }

    pub fn locked(&self) -> bool {
        self.get("locked").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Append saved versions, keeping the ones already listed.
    pub async fn add_versions(&mut self, versions: &[Version]) -> SgResult<FieldMap> {
        let links: Vec<Value> = versions
            .iter()
            .filter_map(|v| v.to_ref())
            .map(|r| r.to_value())
            .collect();
        let mut fields = FieldMap::new();
        fields.insert("versions".to_string(), Value::Array(links));
        let mut modes = UpdateModes::new();
        modes.insert("versions".to_string(), UpdateMode::Add);
        self.update(Some(modes), fields).await
    }
}

impl Delivery {
    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }
}
