//! Static registry of supported entity types.
//!
//! Each kind declares its remote type string, the fields fetched by default
//! and the natural key used when loading it by name.

use std::fmt;

/// Supported entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Sequence,
    Shot,
    Asset,
    Step,
    Task,
    Version,
    PublishedFile,
    Playlist,
    Delivery,
    Person,
    Group,
    YPackage,
    YMedia,
}

/// Registry entry for one kind.
#[derive(Debug)]
pub struct KindInfo {
    pub kind: EntityKind,
    /// Wrapper name used in display output
    pub name: &'static str,
    /// Remote entity type string
    pub entity_type: &'static str,
    /// Fields fetched when the caller does not ask for specific ones
    pub fields: &'static [&'static str],
    /// Natural key field used by `load_entity`; `None` when the kind is not loadable
    pub key_field: Option<&'static str>,
}

static REGISTRY: &[KindInfo] = &[
    KindInfo {
        kind: EntityKind::Project,
        name: "Project",
        entity_type: "Project",
        fields: &["id", "sg_description", "code", "name", "sg_status", "sg_type"],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Sequence,
        name: "Sequence",
        entity_type: "Sequence",
        fields: &["id", "description", "code", "tags", "sg_status_list", "shots"],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Shot,
        name: "Shot",
        entity_type: "Shot",
        fields: &[
            "id",
            "description",
            "code",
            "tags",
            "sg_status_list",
            "sg_sequence",
            "sg_cut_in",
            "sg_cut_out",
            "sg_cut_duration",
        ],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Asset,
        name: "Asset",
        entity_type: "Asset",
        fields: &["id", "description", "code", "tags", "sg_status_list", "sg_asset_type"],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Step,
        name: "Step",
        entity_type: "Step",
        fields: &["id", "code", "description", "entity_type", "short_name", "sg_tank_name"],
        key_field: None,
    },
    KindInfo {
        kind: EntityKind::Task,
        name: "Task",
        entity_type: "Task",
        fields: &[
            "id",
            "content",
            "entity",
            "step",
            "sg_status_list",
            "task_assignees",
            "start_date",
            "due_date",
            "tags",
        ],
        key_field: Some("content"),
    },
    KindInfo {
        kind: EntityKind::Version,
        name: "Version",
        entity_type: "Version",
        fields: &[
            "id",
            "description",
            "code",
            "tags",
            "entity",
            "published_files",
            "sg_path_to_frames",
            "sg_version_type",
            "sg_status_list",
            "sg_uploaded_movie",
            "sg_ingests",
        ],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::PublishedFile,
        name: "PublishedFile",
        entity_type: "PublishedFile",
        fields: &[
            "id",
            "description",
            "code",
            "name",
            "entity",
            "tags",
            "published_file_type",
            "version",
            "version_number",
        ],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Playlist,
        name: "Playlist",
        entity_type: "Playlist",
        fields: &["id", "code", "description", "versions", "locked", "tags"],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::Delivery,
        name: "Delivery",
        entity_type: "Delivery",
        fields: &["id", "title", "description", "sg_status_list", "tags"],
        key_field: None,
    },
    KindInfo {
        kind: EntityKind::Person,
        name: "Person",
        entity_type: "Person",
        fields: &["id", "name", "login", "email", "sg_status_list"],
        key_field: Some("name"),
    },
    KindInfo {
        kind: EntityKind::Group,
        name: "Group",
        entity_type: "Group",
        fields: &["id", "code", "sg_vendor_code", "users", "sg_status_list"],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::YPackage,
        name: "YPackage",
        entity_type: "CustomEntity07",
        fields: &[
            "id",
            "description",
            "code",
            "sg_status_list",
            "sg_yaction",
            "sg_ynotes",
            "sg_yissue",
            "tags",
        ],
        key_field: Some("code"),
    },
    KindInfo {
        kind: EntityKind::YMedia,
        name: "YMedia",
        entity_type: "CustomEntity06",
        fields: &[
            "id",
            "code",
            "tags",
            "sg_ypackage",
            "sg_ynotes",
            "sg_yaction",
            "sg_yissue",
            "description",
            "sg_submitted_for",
            "sg_status_list",
            "sg_srcpath",
            "sg_dstpath",
            "sg_link",
            "sg_task",
            "sg_version",
            "sg_publishedfile",
            "sg_pubfiletype",
            "sg_playlist",
            "sg_ystatus",
            "sg_ylogs",
            "sg_ysteps",
            "sg_user",
        ],
        key_field: Some("code"),
    },
];

impl EntityKind {
    pub fn info(self) -> &'static KindInfo {
        // REGISTRY is declared in variant order.
        &REGISTRY[self as usize]
    }

    /// Look up a kind by its remote entity type string.
    pub fn from_entity_type(entity_type: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|info| info.entity_type == entity_type)
            .map(|info| info.kind)
    }

    pub fn all() -> impl Iterator<Item = EntityKind> {
        REGISTRY.iter().map(|info| info.kind)
    }

    pub fn entity_type(self) -> &'static str {
        self.info().entity_type
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn fields(self) -> &'static [&'static str] {
        self.info().fields
    }

    pub fn key_field(self) -> Option<&'static str> {
        self.info().key_field
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
