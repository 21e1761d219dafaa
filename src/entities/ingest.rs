//! Ingest tracking custom entities.

use super::entity_wrapper;
use crate::fields::EntityRef;

entity_wrapper!(
    /// An ingest package (`CustomEntity07`).
    YPackage => YPackage
);

entity_wrapper!(
    /// One media item of an ingest package (`CustomEntity06`).
    YMedia => YMedia
);

impl YPackage {
    /// Fields administered by users on the site; automation leaves them alone.
    pub const USER_FIELDS: &'static [&'static str] = &["sg_status_list", "sg_yaction"];

    pub fn action(&self) -> Option<&str> {
        self.get_str("sg_yaction")
    }

    pub fn notes(&self) -> Option<&str> {
        self.get_str("sg_ynotes")
    }
}

impl YMedia {
    pub fn package(&self) -> Option<EntityRef> {
        self.get("sg_ypackage").and_then(EntityRef::from_value)
    }

    pub fn src_path(&self) -> Option<&str> {
        self.get_str("sg_srcpath")
    }

    pub fn dst_path(&self) -> Option<&str> {
        self.get_str("sg_dstpath")
    }

    pub fn ingest_status(&self) -> Option<&str> {
        self.get_str("sg_ystatus")
    }
}
