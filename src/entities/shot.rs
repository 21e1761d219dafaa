use super::{entity_wrapper, Step, Task, Version};
use crate::entity::Entity;
use crate::error::SgResult;
use crate::fields::{EntityRef, FieldMap};

entity_wrapper!(
    /// A single shot, linked to a sequence.
    Shot => Shot
);

entity_wrapper!(
    /// A reusable asset (character, prop, environment).
    Asset => Asset
);

async fn new_task(
    owner: &Entity,
    content: &str,
    step: Option<&Step>,
    mut data: FieldMap,
) -> SgResult<Task> {
    data.insert("content".to_string(), content.into());
    data.insert("entity".to_string(), owner.link()?);
    if let Some(step) = step {
        data.insert("step".to_string(), step.link()?);
    }
    owner.create_child(data).await
}

async fn new_version(
    owner: &Entity,
    code: &str,
    task: Option<&Task>,
    mut data: FieldMap,
) -> SgResult<Version> {
    data.insert("code".to_string(), code.into());
    data.insert("entity".to_string(), owner.link()?);
    if let Some(task) = task {
        data.insert("sg_task".to_string(), task.link()?);
    }
    owner.create_child(data).await
}

impl Shot {
    pub fn sequence(&self) -> Option<EntityRef> {
        self.get("sg_sequence").and_then(EntityRef::from_value)
    }

    pub fn cut_in(&self) -> Option<i64> {
        self.get("sg_cut_in").and_then(|v| v.as_i64())
    }

    pub fn cut_out(&self) -> Option<i64> {
        self.get("sg_cut_out").and_then(|v| v.as_i64())
    }

    /// Create a task linked to this shot.
    pub async fn create_task(&self, content: &str, step: Option<&Step>, data: FieldMap) -> SgResult<Task> {
        new_task(self, content, step, data).await
    }

    /// Create a version linked to this shot.
    pub async fn create_version(
        &self,
        code: &str,
        task: Option<&Task>,
        data: FieldMap,
    ) -> SgResult<Version> {
        new_version(self, code, task, data).await
    }
}

impl Asset {
    pub fn asset_type(&self) -> Option<&str> {
        self.get_str("sg_asset_type")
    }

    pub async fn create_task(&self, content: &str, step: Option<&Step>, data: FieldMap) -> SgResult<Task> {
        new_task(self, content, step, data).await
    }

    pub async fn create_version(
        &self,
        code: &str,
        task: Option<&Task>,
        data: FieldMap,
    ) -> SgResult<Version> {
        new_version(self, code, task, data).await
    }
}
