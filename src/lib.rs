//! # ShotGrid entities
//!
//! Typed proxies over a production-tracking site's entities (projects,
//! sequences, shots, tasks, versions, published files and more).
//!
//! This library provides:
//! - A generic [`Entity`] proxy with create/update/delete and child queries
//! - Typed wrappers adding per-type accessors and convenience creators
//! - Movie attachment upload/download with bounded retries
//! - A [`Session`] root with memoized lookup tables
//!
//! ## Architecture
//!
//! ```text
//!   Project / Shot / Version ...   (typed wrappers)
//!                 |
//!                 v
//!             Entity  ---- ParentLink (type, id, project)
//!                 |
//!                 v
//!             Session  ---- LookupCache
//!                 |
//!                 v
//!           dyn Api  (RestClient | InMemoryApi)
//! ```
//!
//! ## Modules
//! - `api`: query surface and its REST / in-memory backends
//! - `entity`: generic proxy, kind registry, `load_entity`
//! - `entities`: typed wrappers
//! - `media`: movie attachments
//! - `session`: root handle
//! - `helpers`, `tags`, `filters`, `fields`: pure data helpers

pub mod api;
pub mod cache;
pub mod config;
pub mod entities;
pub mod entity;
pub mod error;
pub mod fields;
pub mod filters;
pub mod helpers;
pub mod logging;
pub mod media;
pub mod session;
pub mod tags;

pub use api::{Api, InMemoryApi, RestClient};
pub use config::Config;
pub use entities::{
    Asset, Delivery, Group, Person, Playlist, Project, PublishedFile, Sequence, Shot, Step, Task,
    TypedEntity, Version, YMedia, YPackage,
};
pub use entity::{Entity, EntityKind, Missing, Retrieval};
pub use error::{SgError, SgResult};
pub use fields::{EntityRef, FieldMap};
pub use filters::{Filter, Operator, Order};
pub use media::Movie;
pub use session::Session;
