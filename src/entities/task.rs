use super::entity_wrapper;
use crate::error::SgResult;
use crate::fields::{EntityRef, FieldMap};

entity_wrapper!(
    /// A unit of work on a shot or asset.
    Task => Task
);

entity_wrapper!(
    /// A pipeline step (comp, anim, lighting).
    Step => Step
);

impl Task {
    pub fn content(&self) -> Option<&str> {
        self.get_str("content")
    }

    pub fn step(&self) -> Option<EntityRef> {
        self.get("step").and_then(EntityRef::from_value)
    }

    /// The shot or asset this task belongs to.
    pub fn entity(&self) -> Option<EntityRef> {
        self.get("entity").and_then(EntityRef::from_value)
    }

    pub fn assignees(&self) -> Vec<EntityRef> {
        self.get("task_assignees")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(EntityRef::from_value).collect())
            .unwrap_or_default()
    }
}

impl Step {
    pub fn short_name(&self) -> Option<&str> {
        self.get_str("short_name")
    }

    /// Create a task on this step. Pass the owning shot or asset as `entity` in `data`.
    pub async fn create_task(&self, content: &str, mut data: FieldMap) -> SgResult<Task> {
        data.insert("content".to_string(), content.into());
        data.insert("step".to_string(), self.link()?);
        self.create_child(data).await
    }
}
