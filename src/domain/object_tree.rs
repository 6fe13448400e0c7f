//! Exposed Object Tree
//!
//! Path-keyed registry of every entity the peripheral publishes. The tree is
//! a strict hierarchy (application → service → characteristic) plus the
//! free-standing advertisement and media endpoint. It is fully built before
//! anything is exported, because the daemon walks the application root
//! synchronously while handling `RegisterApplication`.

use crate::domain::characteristic::CharacteristicStore;
use crate::domain::error::PeripheralError;
use crate::domain::models::{Advertisement, CharacteristicEvent, GattService, MediaEndpoint};
use crate::domain::settings::Settings;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info_span, Span};
use uuid::Uuid;

/// Fixed object paths of the exported entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPaths {
    pub application: String,
    pub service: String,
    pub advertisement: String,
    pub media_endpoint: String,
}

impl Default for ObjectPaths {
    fn default() -> Self {
        Self {
            application: "/com/example/gatt/app".to_string(),
            service: "/com/example/gatt/app/service0".to_string(),
            advertisement: "/com/example/gatt/advertisement0".to_string(),
            media_endpoint: "/com/example/gatt/endpoint0".to_string(),
        }
    }
}

impl ObjectPaths {
    pub fn characteristic(&self, index: usize) -> String {
        format!("{}/char{}", self.service, index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Application,
    Service,
    Characteristic,
    Advertisement,
    MediaEndpoint,
}

#[derive(Clone)]
pub enum Entity {
    /// Application root; carries the object-manager capability.
    Application { path: String },
    Service(GattService),
    Characteristic(Arc<CharacteristicStore>),
    Advertisement(Advertisement),
    MediaEndpoint(MediaEndpoint),
}

impl Entity {
    pub fn path(&self) -> &str {
        match self {
            Self::Application { path } => path,
            Self::Service(service) => &service.path,
            Self::Characteristic(store) => store.path(),
            Self::Advertisement(adv) => &adv.path,
            Self::MediaEndpoint(endpoint) => &endpoint.path,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Application { .. } => EntityKind::Application,
            Self::Service(_) => EntityKind::Service,
            Self::Characteristic(_) => EntityKind::Characteristic,
            Self::Advertisement(_) => EntityKind::Advertisement,
            Self::MediaEndpoint(_) => EntityKind::MediaEndpoint,
        }
    }

    /// Path of the owning entity, for the kinds that sit in the hierarchy.
    fn parent_path(&self) -> Option<&str> {
        match self {
            Self::Service(service) => service.path.rsplit_once('/').map(|(parent, _)| parent),
            Self::Characteristic(store) => Some(store.service_path()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.path())
    }
}

/// Entities in exposure order; teardown walks it backwards.
#[derive(Debug, Default)]
pub struct ObjectTree {
    entities: Vec<Entity>,
    paths: HashSet<String>,
    sampled: Option<Arc<CharacteristicStore>>,
}

impl ObjectTree {
    /// Build the whole tree from settings. The application root comes first.
    pub fn build(
        settings: &Settings,
        paths: &ObjectPaths,
        event_sender: mpsc::UnboundedSender<CharacteristicEvent>,
        span: &Span,
    ) -> Result<Self, PeripheralError> {
        if settings.characteristics.is_empty() {
            return Err(PeripheralError::export(
                &paths.service,
                "service needs at least one characteristic",
            ));
        }
        let service_uuid = canonical_uuid(&paths.service, &settings.service_uuid)?;

        let mut tree = Self::default();
        tree.insert(Entity::Application {
            path: paths.application.clone(),
        })?;

        let char_paths: Vec<String> = (0..settings.characteristics.len())
            .map(|i| paths.characteristic(i))
            .collect();
        tree.insert(Entity::Service(GattService {
            path: paths.service.clone(),
            uuid: service_uuid.clone(),
            primary: true,
            characteristics: char_paths.clone(),
        }))?;

        for (config, path) in settings.characteristics.iter().zip(char_paths) {
            let uuid = canonical_uuid(&path, &config.uuid)?;
            let store = Arc::new(CharacteristicStore::new(
                path.clone(),
                uuid,
                paths.service.clone(),
                config.initial_value.clone(),
                event_sender.clone(),
                info_span!(parent: span, "characteristic", path = %path),
            ));
            if config.sampled && tree.sampled.is_none() {
                tree.sampled = Some(store.clone());
            }
            tree.insert(Entity::Characteristic(store))?;
        }

        tree.insert(Entity::Advertisement(Advertisement {
            path: paths.advertisement.clone(),
            adv_type: "peripheral".to_string(),
            local_name: settings.local_name.clone(),
            service_uuids: vec![service_uuid],
            discoverable: true,
        }))?;

        if let Some(endpoint) = &settings.media_endpoint {
            let uuid = canonical_uuid(&paths.media_endpoint, &endpoint.uuid)?;
            tree.insert(Entity::MediaEndpoint(MediaEndpoint {
                path: paths.media_endpoint.clone(),
                uuid,
                codec: endpoint.codec,
                capabilities: endpoint.capabilities.clone(),
            }))?;
        }

        Ok(tree)
    }

    /// Add one entity, enforcing unique paths and parent-before-child.
    pub fn insert(&mut self, entity: Entity) -> Result<(), PeripheralError> {
        let path = entity.path().to_string();
        if !path.starts_with('/') {
            return Err(PeripheralError::export(path, "object path must be absolute"));
        }
        if self.paths.contains(&path) {
            return Err(PeripheralError::export(path, "already exposed"));
        }
        if entity.kind() == EntityKind::Application && self.application().is_some() {
            return Err(PeripheralError::export(path, "second application root"));
        }
        if let Some(parent) = entity.parent_path() {
            let expected = match entity.kind() {
                EntityKind::Service => EntityKind::Application,
                _ => EntityKind::Service,
            };
            let parent_ok = self
                .get(parent)
                .map(|p| p.kind() == expected)
                .unwrap_or(false);
            if !parent_ok || !path.starts_with(&format!("{}/", parent)) {
                return Err(PeripheralError::export(
                    path,
                    format!("parent {} is not an exposed {:?}", parent, expected),
                ));
            }
        }

        self.paths.insert(path);
        self.entities.push(entity);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.path() == path)
    }

    /// Exposure order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn application(&self) -> Option<&str> {
        self.first_of(EntityKind::Application)
    }

    pub fn advertisement(&self) -> Option<&str> {
        self.first_of(EntityKind::Advertisement)
    }

    pub fn media_endpoint(&self) -> Option<&MediaEndpoint> {
        self.entities.iter().find_map(|e| match e {
            Entity::MediaEndpoint(endpoint) => Some(endpoint),
            _ => None,
        })
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &Arc<CharacteristicStore>> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Characteristic(store) => Some(store),
            _ => None,
        })
    }

    /// The characteristic the background sampler feeds, if any.
    pub fn sampled_characteristic(&self) -> Option<Arc<CharacteristicStore>> {
        self.sampled.clone()
    }

    fn first_of(&self, kind: EntityKind) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| e.kind() == kind)
            .map(|e| e.path())
    }
}

fn canonical_uuid(path: &str, raw: &str) -> Result<String, PeripheralError> {
    Uuid::parse_str(raw)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| PeripheralError::export(path, format!("invalid UUID {:?}: {}", raw, e)))
}
