//! World module
//!
//! Owns every map and drives them through the fixed-step scheduler:
//! - Player actions queued by the network layer, applied at the next step
//! - Map physics and collision per step
//! - World events for observers
//! - Periodic autosave through the persistence collaborator

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{GameError, Result};
use crate::game::clock::{SystemClock, TimeSource};
use crate::game::data::MapDefinition;
use crate::game::entity::{Entity, EntityId, EntityRole, TemplateId};
use crate::game::events::{EventBus, WorldEvent};
use crate::game::factory::EntityFactory;
use crate::game::map::{Map, MapId, PhysicsSettings, PlayerAction};
use crate::game::persistence::EntityRepository;
use crate::game::scheduler::{
    MapUpdater, SchedulerState, UpdateReport, UpdateScheduler, DEFAULT_MAX_UPDATE_DELTA_MS,
    DEFAULT_UPDATE_RATE_MS,
};
use crate::spatial::Spatial;

/// Default autosave interval in steps (5 minutes at 20ms)
pub const AUTOSAVE_INTERVAL_STEPS: u64 = 15_000;

/// Default spatial grid segment size
pub const DEFAULT_SEGMENT_SIZE: u32 = 32;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// World name
    pub name: String,
    /// Simulation step in milliseconds
    pub update_rate_ms: u32,
    /// Largest backlog replayed in one update
    pub max_update_delta_ms: u32,
    /// Autosave interval in steps (0 to disable)
    pub autosave_interval_steps: u64,
    /// Spatial grid segment size for new maps
    pub segment_size: u32,
    /// Physics constants for new maps
    pub physics: PhysicsSettings,
    /// Seed for NPC behaviour
    pub rng_seed: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "DemoGame".to_string(),
            update_rate_ms: DEFAULT_UPDATE_RATE_MS,
            max_update_delta_ms: DEFAULT_MAX_UPDATE_DELTA_MS,
            autosave_interval_steps: AUTOSAVE_INTERVAL_STEPS,
            segment_size: DEFAULT_SEGMENT_SIZE,
            physics: PhysicsSettings::default(),
            rng_seed: 0,
        }
    }
}

impl WorldSettings {
    /// Set the world name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the step length and backlog cap
    pub fn with_update_rate(mut self, update_rate_ms: u32, max_update_delta_ms: u32) -> Self {
        self.update_rate_ms = update_rate_ms;
        self.max_update_delta_ms = max_update_delta_ms;
        self
    }

    /// Set the autosave interval
    pub fn with_autosave_interval(mut self, steps: u64) -> Self {
        self.autosave_interval_steps = steps;
        self
    }

    pub fn with_segment_size(mut self, segment_size: u32) -> Self {
        self.segment_size = segment_size;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsSettings) -> Self {
        self.physics = physics;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }
}

/// Action waiting for the next step
#[derive(Debug, Clone)]
struct QueuedAction {
    map: MapId,
    entity: EntityId,
    action: PlayerAction,
}

/// Everything the scheduler steps
struct Simulation {
    maps: BTreeMap<MapId, Map>,
    pending: VecDeque<QueuedAction>,
    events: EventBus,
    repository: Arc<dyn EntityRepository>,
    autosave_interval: u64,
    steps: u64,
}

impl Simulation {
    fn apply_pending(&mut self) {
        while let Some(queued) = self.pending.pop_front() {
            let Some(map) = self.maps.get_mut(&queued.map) else {
                warn!(map = queued.map, entity = %queued.entity, "Action for unknown map dropped");
                continue;
            };

            if let PlayerAction::Say(message) = &queued.action {
                if map.entity(queued.entity).is_none() {
                    warn!(map = queued.map, entity = %queued.entity, "Chat from unknown entity dropped");
                    continue;
                }
                info!(map = queued.map, entity = %queued.entity, message = %message, "Chat");
                self.events.publish(WorldEvent::Chat {
                    map: queued.map,
                    entity: queued.entity,
                    message: message.clone(),
                });
                continue;
            }

            if let Err(e) = map.apply_action(queued.entity, &queued.action) {
                warn!(
                    map = queued.map,
                    entity = %queued.entity,
                    action = ?queued.action,
                    error = %e,
                    "Failed to apply player action"
                );
            }
        }
    }

    /// Persist every non-wall entity of every map
    fn save_all(&mut self) -> (usize, usize) {
        let mut saved = 0;
        let mut failed = 0;

        for (id, map) in &self.maps {
            let snapshots: Vec<_> = map
                .entities()
                .filter(|entity| entity.role != EntityRole::Wall)
                .map(Entity::snapshot)
                .collect();
            if snapshots.is_empty() {
                continue;
            }

            match self.repository.save_entities(*id, &snapshots) {
                Ok(()) => {
                    saved += snapshots.len();
                    debug!(map = id, count = snapshots.len(), "Saved map entities");
                }
                Err(e) => {
                    failed += snapshots.len();
                    error!(map = id, error = %e, "Failed to save map entities");
                }
            }
        }

        self.events.publish(WorldEvent::Autosaved { saved, failed });
        (saved, failed)
    }
}

impl MapUpdater for Simulation {
    fn update_maps(&mut self, delta_ms: u32) {
        self.apply_pending();

        for (id, map) in self.maps.iter_mut() {
            for contact in map.update(delta_ms) {
                self.events.publish(WorldEvent::Collision {
                    map: *id,
                    mover: contact.mover,
                    other: contact.other,
                });
            }
        }

        self.steps += 1;
        if self.steps % 1000 == 0 {
            debug!(step = self.steps, maps = self.maps.len(), "Simulation step milestone");
        }

        if self.autosave_interval > 0 && self.steps % self.autosave_interval == 0 {
            info!(step = self.steps, "Starting periodic autosave");
            let (saved, failed) = self.save_all();
            info!(saved = saved, failed = failed, "Autosave complete");
        }
    }
}

/// Game world - owns the maps and the update clock
pub struct GameWorld {
    /// World settings
    pub settings: WorldSettings,
    scheduler: UpdateScheduler,
    clock: Arc<dyn TimeSource>,
    simulation: Simulation,
    factory: Arc<EntityFactory>,
    start_time: Instant,
}

impl GameWorld {
    /// Create a world driven by the system clock
    pub fn new(
        settings: WorldSettings,
        repository: Arc<dyn EntityRepository>,
        factory: Arc<EntityFactory>,
    ) -> Self {
        Self::with_clock(settings, repository, factory, Arc::new(SystemClock::new()))
    }

    /// Create a world driven by an explicit time source
    pub fn with_clock(
        settings: WorldSettings,
        repository: Arc<dyn EntityRepository>,
        factory: Arc<EntityFactory>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        info!(
            name = %settings.name,
            update_rate_ms = settings.update_rate_ms,
            max_update_delta_ms = settings.max_update_delta_ms,
            "Creating game world"
        );

        Self {
            scheduler: UpdateScheduler::new(settings.update_rate_ms, settings.max_update_delta_ms),
            simulation: Simulation {
                maps: BTreeMap::new(),
                pending: VecDeque::new(),
                events: EventBus::new(),
                repository,
                autosave_interval: settings.autosave_interval_steps,
                steps: 0,
            },
            settings,
            clock,
            factory,
            start_time: Instant::now(),
        }
    }

    /// Build a map from its definition and spawn its initial entities.
    ///
    /// A spawn whose template cannot be loaded is logged and skipped.
    pub fn add_map(&mut self, definition: &MapDefinition) -> Result<()> {
        let map = Map::new(
            definition.id,
            definition.name.clone(),
            Vec2::new(definition.width, definition.height),
            self.settings.segment_size,
            self.settings.physics,
            self.settings.rng_seed,
        )?;
        self.simulation.maps.insert(definition.id, map);

        for spawn in &definition.spawns {
            if let Err(e) = self.spawn(definition.id, spawn.template, Vec2::new(spawn.x, spawn.y)) {
                warn!(
                    map = definition.id,
                    template = spawn.template,
                    error = %e,
                    "Skipping map spawn"
                );
            }
        }

        info!(
            map = definition.id,
            name = %definition.name,
            entities = self.map(definition.id).map(Map::len).unwrap_or(0),
            "Map loaded"
        );
        Ok(())
    }

    /// Add a prebuilt map, replacing any with the same id
    pub fn insert_map(&mut self, map: Map) {
        self.simulation.maps.insert(map.id(), map);
    }

    pub fn map(&self, id: MapId) -> Option<&Map> {
        self.simulation.maps.get(&id)
    }

    pub fn map_mut(&mut self, id: MapId) -> Option<&mut Map> {
        self.simulation.maps.get_mut(&id)
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.simulation.maps.values()
    }

    /// Spawn an entity from a stored template
    pub fn spawn(&mut self, map: MapId, template_id: TemplateId, position: Vec2) -> Result<EntityId> {
        if !self.simulation.maps.contains_key(&map) {
            return Err(GameError::MapNotFound(map).into());
        }
        let template = self.simulation.repository.load_template(template_id)?;
        let entity = self.factory.create(&template, position)?;
        self.spawn_entity(map, entity)
    }

    /// Place an already constructed entity
    pub fn spawn_entity(&mut self, map: MapId, entity: Entity) -> Result<EntityId> {
        let role = entity.role;
        let target = self
            .simulation
            .maps
            .get_mut(&map)
            .ok_or(GameError::MapNotFound(map))?;
        let id = target.spawn(entity);
        self.simulation.events.publish(WorldEvent::EntitySpawned {
            map,
            entity: id,
            role,
        });
        Ok(id)
    }

    /// Remove an entity. Players are saved on the way out, and actions still
    /// queued for the entity are dropped.
    pub fn despawn(&mut self, map: MapId, id: EntityId) -> Result<Entity> {
        let target = self
            .simulation
            .maps
            .get_mut(&map)
            .ok_or(GameError::MapNotFound(map))?;
        let entity = target.despawn(id).ok_or(GameError::EntityNotFound(id.0))?;
        self.simulation
            .pending
            .retain(|queued| !(queued.map == map && queued.entity == id));

        if entity.role == EntityRole::Player {
            if let Err(e) = self
                .simulation
                .repository
                .save_entities(map, &[entity.snapshot()])
            {
                error!(map, entity = %id, error = %e, "Failed to save departing player");
            }
        }

        self.simulation
            .events
            .publish(WorldEvent::EntityDespawned { map, entity: id });
        Ok(entity)
    }

    /// Queue a player action for the next simulation step
    pub fn queue_action(&mut self, map: MapId, entity: EntityId, action: PlayerAction) {
        self.simulation.pending.push_back(QueuedAction {
            map,
            entity,
            action,
        });
    }

    /// Actions waiting for the next step
    pub fn pending_actions(&self) -> usize {
        self.simulation.pending.len()
    }

    /// Run every simulation step due now. Call once per host frame.
    pub fn update(&mut self) -> UpdateReport {
        let now = self.clock.now();
        let report = self.scheduler.update(now, &mut self.simulation);
        if report.skipped_ms > 0 {
            self.simulation.events.publish(WorldEvent::BacklogSkipped {
                skipped_ms: report.skipped_ms,
            });
        }
        report
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Subscribe to world events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<WorldEvent> {
        self.simulation.events.subscribe()
    }

    /// Persist every non-wall entity now. Returns (saved, failed) counts.
    pub fn save_all(&mut self) -> (usize, usize) {
        let (saved, failed) = self.simulation.save_all();
        info!(saved = saved, failed = failed, "World saved");
        (saved, failed)
    }

    /// Total entities across all maps
    pub fn entity_count(&self) -> usize {
        self.simulation.maps.values().map(Map::len).sum()
    }

    /// Simulation steps run since creation
    pub fn steps(&self) -> u64 {
        self.simulation.steps
    }

    /// Get the uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Bounding box of an entity, if it exists on the map
    pub fn entity_bounds(&self, map: MapId, id: EntityId) -> Option<crate::spatial::Rect> {
        self.map(map).and_then(|m| m.entity(id)).map(Spatial::bounds)
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "World {} - {} maps - {} entities - {} - Step {} - Uptime {}s",
            self.settings.name,
            self.simulation.maps.len(),
            self.entity_count(),
            self.state(),
            self.steps(),
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for GameWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameWorld")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("steps", &self.steps())
            .field("maps", &self.simulation.maps.len())
            .field("entities", &self.entity_count())
            .field("pending_actions", &self.pending_actions())
            .field("uptime_secs", &self.uptime_secs())
            .finish()
    }
}
