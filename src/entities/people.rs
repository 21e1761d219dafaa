use serde_json::Value;

use super::entity_wrapper;
use crate::fields::EntityRef;

entity_wrapper!(
    /// A human user of the site.
    Person => Person
);

entity_wrapper!(
    /// A group of people, keyed by vendor code in lookups.
    Group => Group
);

impl Person {
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn login(&self) -> Option<&str> {
        self.get_str("login")
    }

    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }
}

impl Group {
    pub fn vendor_code(&self) -> Option<&str> {
        self.get_str("sg_vendor_code")
    }

    pub fn users(&self) -> Vec<EntityRef> {
        self.get("users")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(EntityRef::from_value).collect())
            .unwrap_or_default()
    }
}
