//! Entity persistence
//!
//! The simulation only needs two things from storage: fetch a template by id
//! and store entity state. Anything behind [`EntityRepository`] (a database,
//! files, a remote service) is the collaborator's business, including retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::PersistenceError;
use crate::game::entity::{EntityId, EntitySnapshot, TemplateId};
use crate::game::factory::EntityTemplate;
use crate::game::map::MapId;

/// Storage collaborator used by the world
pub trait EntityRepository: Send + Sync {
    /// Fetch an entity template
    fn load_template(&self, id: TemplateId) -> Result<EntityTemplate, PersistenceError>;

    /// Store the state of some entities of a map (insert or replace by id)
    fn save_entities(&self, map: MapId, entities: &[EntitySnapshot]) -> Result<(), PersistenceError>;

    /// Last stored state of a map's entities, ordered by id
    fn load_entities(&self, map: MapId) -> Result<Vec<EntitySnapshot>, PersistenceError>;
}

/// Repository kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    templates: RwLock<HashMap<TemplateId, EntityTemplate>>,
    entities: RwLock<HashMap<MapId, BTreeMap<EntityId, EntitySnapshot>>>,
    saves: AtomicU64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository preloaded with templates
    pub fn with_templates(templates: impl IntoIterator<Item = EntityTemplate>) -> Self {
        let repository = Self::new();
        for template in templates {
            repository.insert_template(template);
        }
        repository
    }

    pub fn insert_template(&self, template: EntityTemplate) {
        self.templates.write().insert(template.id, template);
    }

    pub fn template_count(&self) -> usize {
        self.templates.read().len()
    }

    /// Number of successful `save_entities` calls
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl EntityRepository for InMemoryRepository {
    fn load_template(&self, id: TemplateId) -> Result<EntityTemplate, PersistenceError> {
        self.templates
            .read()
            .get(&id)
            .cloned()
            .ok_or(PersistenceError::TemplateNotFound(id))
    }

    fn save_entities(&self, map: MapId, entities: &[EntitySnapshot]) -> Result<(), PersistenceError> {
        let mut stored = self.entities.write();
        let map_entities = stored.entry(map).or_default();
        for snapshot in entities {
            map_entities.insert(snapshot.id, snapshot.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        debug!(map, count = entities.len(), "Saved entities");
        Ok(())
    }

    fn load_entities(&self, map: MapId) -> Result<Vec<EntitySnapshot>, PersistenceError> {
        Ok(self
            .entities
            .read()
            .get(&map)
            .map(|entities| entities.values().cloned().collect())
            .unwrap_or_default())
    }
}
