//! Typed entity wrappers.
//!
//! Each wrapper is a newtype over [`Entity`] that derefs to it, so every
//! generic operation is available alongside the typed accessors and the
//! convenience creators/finders defined per type.

mod ingest;
mod people;
mod playlist;
mod project;
mod sequence;
mod shot;
mod task;
mod version;

pub use ingest::{YMedia, YPackage};
pub use people::{Group, Person};
pub use playlist::{Delivery, Playlist};
pub use project::{GroupSelector, Project};
pub use sequence::Sequence;
pub use shot::{Asset, Shot};
pub use task::{Step, Task};
pub use version::{PublishedFile, Version};

use std::ops::Deref;

use crate::entity::{Entity, EntityKind};

/// A typed view over an [`Entity`] of one fixed kind.
pub trait TypedEntity: Sized + Deref<Target = Entity> {
    const KIND: EntityKind;

    /// Wrap an entity; callers guarantee its kind is [`Self::KIND`].
    fn wrap(entity: Entity) -> Self;

    fn into_entity(self) -> Entity;
}

macro_rules! entity_wrapper {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(crate::entity::Entity);

        impl crate::entities::TypedEntity for $name {
            const KIND: crate::entity::EntityKind = crate::entity::EntityKind::$kind;

            fn wrap(entity: crate::entity::Entity) -> Self {
                debug_assert_eq!(entity.kind(), Self::KIND);
                Self(entity)
            }

            fn into_entity(self) -> crate::entity::Entity {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = crate::entity::Entity;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl From<$name> for crate::entity::Entity {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

pub(crate) use entity_wrapper;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::config::Config;
    use crate::fields::FieldMap;
    use crate::session::Session;
    use std::sync::Arc;

    #[test]
    fn test_downcast() {
        let session = Session::new(
            Arc::new(InMemoryApi::new()),
            Config::new("https://site.example.com", "t", "k"),
        );
        let entity = Entity::new(session, EntityKind::Shot, FieldMap::new(), None);

        let shot = entity.clone().downcast::<Shot>().unwrap();
        assert_eq!(shot.entity_type(), "Shot");
        assert!(entity.downcast::<Asset>().is_err());
        assert_eq!(Entity::from(shot).kind(), EntityKind::Shot);
    }
}
