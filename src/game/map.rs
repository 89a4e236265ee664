//! Map module
//!
//! A map owns its entities and the spatial grid indexing them, and advances
//! them one fixed step at a time.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::error::{GameError, Result};
use crate::game::collision::{find_standing_on, CollisionHandler, CollisionResolver};
use crate::game::entity::{Entity, EntityId, EntitySnapshot, EntityStore, WanderState};
use crate::spatial::{Rect, Spatial, SpatialGrid, SpatialKind};

/// Map identifier
pub type MapId = u16;

/// Shortest NPC wander decision interval
const WANDER_MIN_MS: u32 = 500;

/// Longest NPC wander decision interval
const WANDER_MAX_MS: u32 = 3000;

/// NPCs walk slower than players
const NPC_SPEED_FACTOR: f32 = 0.5;

/// Physics constants, in world units and milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsSettings {
    /// Downward acceleration (units/ms²)
    pub gravity: f32,
    /// Terminal falling speed (units/ms)
    pub max_fall_speed: f32,
    /// Horizontal walking speed (units/ms)
    pub move_speed: f32,
    /// Initial vertical speed of a jump (units/ms, negative is up)
    pub jump_velocity: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: 0.0009,
            max_fall_speed: 0.6,
            move_speed: 0.18,
            jump_velocity: -0.48,
        }
    }
}

/// Input from a player, applied at the start of the next step
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    MoveLeft,
    MoveRight,
    StopMoving,
    Jump,
    Say(String),
}

/// Two entities touched during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub mover: EntityId,
    pub other: EntityId,
}

/// A single world area with its own entities and spatial index
pub struct Map {
    id: MapId,
    name: String,
    size: Vec2,
    entities: EntityStore,
    grid: SpatialGrid<EntityId>,
    collisions: CollisionResolver,
    physics: PhysicsSettings,
    rng: StdRng,
}

impl Map {
    /// Create an empty map
    pub fn new(
        id: MapId,
        name: impl Into<String>,
        size: Vec2,
        segment_size: u32,
        physics: PhysicsSettings,
        rng_seed: u64,
    ) -> Result<Self> {
        let grid = SpatialGrid::new(size, segment_size)?;
        let name = name.into();
        debug!(map = id, name = %name, width = size.x, height = size.y, "Created map");

        Ok(Self {
            id,
            name,
            size,
            entities: EntityStore::new(),
            grid,
            collisions: CollisionResolver::default(),
            physics,
            rng: StdRng::seed_from_u64(rng_seed ^ id as u64),
        })
    }

    /// Replace the collision reaction strategy
    pub fn with_collision_handler(mut self, handler: impl CollisionHandler + 'static) -> Self {
        self.collisions = CollisionResolver::new(handler);
        self
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn physics(&self) -> &PhysicsSettings {
        &self.physics
    }

    /// Number of entities on the map
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn grid(&self) -> &SpatialGrid<EntityId> {
        &self.grid
    }

    /// Place an entity on the map, clamped inside its bounds
    pub fn spawn(&mut self, mut entity: Entity) -> EntityId {
        entity.position = self.clamp_position(entity.position, entity.size);
        let bounds = entity.bounds();
        let kind = entity.spatial_kind();
        let id = self.entities.insert(entity);
        self.grid.add(id, bounds, kind);
        trace!(map = self.id, entity = %id, "Spawned entity");
        id
    }

    /// Remove an entity from the map and the grid
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.grid.remove(id);
        trace!(map = self.id, entity = %id, "Despawned entity");
        Some(entity)
    }

    /// Move an entity instantly
    pub fn teleport(&mut self, id: EntityId, position: Vec2) -> Result<()> {
        let size = self.entity(id).ok_or(GameError::EntityNotFound(id.0))?.size;
        let position = self.clamp_position(position, size);
        if let Some(entity) = self.entities.get_mut(id) {
            entity.position = position;
            entity.standing_on = None;
            let bounds = entity.bounds();
            self.grid.update(id, bounds);
        }
        Ok(())
    }

    /// Change an entity's bounding box size
    pub fn resize(&mut self, id: EntityId, size: Vec2) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id.0))?;
        entity.size = size.max(Vec2::ZERO);
        let bounds = entity.bounds();
        self.grid.update(id, bounds);
        Ok(())
    }

    /// Entities intersecting an area
    pub fn query(&self, area: Rect) -> impl Iterator<Item = &Entity> + '_ {
        self.query_kind(area, SpatialKind::all())
    }

    /// Entities of the given kinds intersecting an area
    pub fn query_kind(&self, area: Rect, kinds: SpatialKind) -> impl Iterator<Item = &Entity> + '_ {
        self.grid
            .query_kind(area, kinds)
            .filter_map(|id| self.entities.get(id))
    }

    /// Entity under a point (click picking)
    pub fn entity_at(&self, point: Vec2, kinds: SpatialKind) -> Option<&Entity> {
        self.grid
            .first_at_kind(point, kinds)
            .and_then(|id| self.entities.get(id))
    }

    /// Run collision detection for one entity
    pub fn check_collisions(&mut self, id: EntityId) -> Vec<EntityId> {
        self.collisions
            .check_collisions(&mut self.entities, &mut self.grid, id)
    }

    /// Wall supporting an entity
    pub fn find_standing_on(&self, id: EntityId) -> Option<EntityId> {
        self.entities
            .get(id)
            .and_then(|entity| find_standing_on(&self.grid, entity))
    }

    /// Apply a movement action to an entity
    pub fn apply_action(&mut self, id: EntityId, action: &PlayerAction) -> Result<()> {
        let physics = self.physics;
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id.0))?;
        if !entity.is_movable() {
            return Err(GameError::InvalidAction(format!("{} cannot move", entity.role)).into());
        }

        match action {
            PlayerAction::MoveLeft => entity.velocity.x = -physics.move_speed,
            PlayerAction::MoveRight => entity.velocity.x = physics.move_speed,
            PlayerAction::StopMoving => entity.velocity.x = 0.0,
            PlayerAction::Jump => {
                if entity.is_standing() {
                    entity.velocity.y = physics.jump_velocity;
                    entity.standing_on = None;
                } else {
                    trace!(entity = %id, "Ignoring jump while airborne");
                }
            }
            PlayerAction::Say(_) => {}
        }
        Ok(())
    }

    /// Advance every entity by one fixed step.
    ///
    /// Entities are processed in insertion order. Returns the contacts made
    /// during the step.
    pub fn update(&mut self, delta_ms: u32) -> Vec<Contact> {
        let dt = delta_ms as f32;
        let ids = self.entities.ids().to_vec();
        let mut contacts = Vec::new();

        for id in ids {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            if !entity.is_movable() {
                continue;
            }

            if let Some(wander) = entity.wander.as_mut() {
                think(wander, &mut self.rng, delta_ms);
                entity.velocity.x =
                    wander.direction as f32 * self.physics.move_speed * NPC_SPEED_FACTOR;
            }

            if entity.standing_on.is_none() {
                entity.velocity.y =
                    (entity.velocity.y + self.physics.gravity * dt).min(self.physics.max_fall_speed);
            }

            let target = entity.position + entity.velocity * dt;
            let clamped = clamp_to(self.size, target, entity.size);
            if clamped.y != target.y {
                entity.velocity.y = 0.0;
            }
            entity.position = clamped;
            let bounds = entity.bounds();
            self.grid.update(id, bounds);

            let hits = self
                .collisions
                .check_collisions(&mut self.entities, &mut self.grid, id);
            contacts.extend(hits.into_iter().map(|other| Contact { mover: id, other }));

            let standing = self
                .entities
                .get(id)
                .and_then(|entity| find_standing_on(&self.grid, entity));
            if let Some(entity) = self.entities.get_mut(id) {
                entity.standing_on = standing;
                if standing.is_some() && entity.velocity.y > 0.0 {
                    entity.velocity.y = 0.0;
                }
            }
        }

        contacts
    }

    /// Read-only view of every entity
    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities.iter().map(Entity::snapshot).collect()
    }

    fn clamp_position(&self, position: Vec2, size: Vec2) -> Vec2 {
        clamp_to(self.size, position, size)
    }
}

fn clamp_to(map_size: Vec2, position: Vec2, size: Vec2) -> Vec2 {
    position.clamp(Vec2::ZERO, (map_size - size).max(Vec2::ZERO))
}

fn think(wander: &mut WanderState, rng: &mut StdRng, delta_ms: u32) {
    if wander.think_in_ms > delta_ms {
        wander.think_in_ms -= delta_ms;
        return;
    }
    wander.direction = rng.gen_range(-1..=1);
    wander.think_in_ms = rng.gen_range(WANDER_MIN_MS..=WANDER_MAX_MS);
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("entities", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityRole;

    fn map() -> Map {
        Map::new(1, "Test", Vec2::new(512.0, 512.0), 32, PhysicsSettings::default(), 7).unwrap()
    }

    fn floor() -> Entity {
        Entity::new(EntityRole::Wall, "floor", Vec2::new(0.0, 400.0), Vec2::new(512.0, 32.0))
    }

    fn player(x: f32, y: f32) -> Entity {
        Entity::new(EntityRole::Player, "hero", Vec2::new(x, y), Vec2::new(16.0, 32.0))
    }

    fn settle(map: &mut Map, steps: usize) {
        for _ in 0..steps {
            map.update(20);
        }
    }

    #[test]
    fn test_rejects_small_segments() {
        assert!(Map::new(1, "Bad", Vec2::new(64.0, 64.0), 2, PhysicsSettings::default(), 0).is_err());
    }

    #[test]
    fn test_spawn_clamps_into_map() {
        let mut map = map();
        let id = map.spawn(player(600.0, -20.0));
        assert_eq!(map.entity(id).unwrap().position, Vec2::new(496.0, 0.0));
        assert_eq!(map.grid().bounds_of(id), Some(map.entity(id).unwrap().bounds()));
    }

    #[test]
    fn test_despawn_removes_from_grid() {
        let mut map = map();
        let id = map.spawn(player(10.0, 10.0));
        assert!(map.despawn(id).is_some());
        assert!(!map.grid().contains(id));
        assert!(map.despawn(id).is_none());
        assert_eq!(map.query(Rect::new(0.0, 0.0, 512.0, 512.0)).count(), 0);
    }

    #[test]
    fn test_teleport_updates_queries() {
        let mut map = map();
        let id = map.spawn(
            Entity::new(EntityRole::Npc, "box", Vec2::ZERO, Vec2::new(10.0, 10.0)).with_weight(0.0),
        );
        map.teleport(id, Vec2::new(40.0, 40.0)).unwrap();
        assert!(map.entity_at(Vec2::new(0.0, 0.0), SpatialKind::all()).is_none());
        assert_eq!(
            map.entity_at(Vec2::new(40.0, 40.0), SpatialKind::all()).map(|e| e.id()),
            Some(id)
        );
        assert!(map.teleport(EntityId(77), Vec2::ZERO).is_err());
    }

    #[test]
    fn test_resize_updates_grid() {
        let mut map = map();
        let id = map.spawn(player(0.0, 0.0));
        map.resize(id, Vec2::new(100.0, 100.0)).unwrap();
        assert_eq!(map.grid().occupied_cells(id).len(), 16);
    }

    #[test]
    fn test_falling_entity_lands_on_floor() {
        let mut map = map();
        let floor = map.spawn(floor());
        let hero = map.spawn(player(100.0, 300.0));

        settle(&mut map, 100);

        let hero = map.entity(hero).unwrap();
        assert_eq!(hero.standing_on, Some(floor));
        assert!((hero.bounds().bottom() - 400.0).abs() < 0.01);
        assert_eq!(hero.velocity.y, 0.0);
    }

    #[test]
    fn test_walk_and_jump() {
        let mut map = map();
        map.spawn(floor());
        let hero = map.spawn(player(100.0, 368.0));
        settle(&mut map, 2);
        assert!(map.entity(hero).unwrap().is_standing());

        map.apply_action(hero, &PlayerAction::MoveRight).unwrap();
        settle(&mut map, 10);
        let x = map.entity(hero).unwrap().position.x;
        assert!(x > 130.0, "walked to {x}");

        map.apply_action(hero, &PlayerAction::Jump).unwrap();
        map.update(20);
        let entity = map.entity(hero).unwrap();
        assert!(!entity.is_standing());
        assert!(entity.position.y < 368.0);

        // A second jump mid-air does nothing
        let vy = entity.velocity.y;
        map.apply_action(hero, &PlayerAction::Jump).unwrap();
        assert_eq!(map.entity(hero).unwrap().velocity.y, vy);
    }

    #[test]
    fn test_walls_cannot_act() {
        let mut map = map();
        let wall = map.spawn(floor());
        assert!(map.apply_action(wall, &PlayerAction::MoveLeft).is_err());
        assert!(map.apply_action(EntityId(50), &PlayerAction::MoveLeft).is_err());
    }

    #[test]
    fn test_wall_blocks_walking() {
        let mut map = map();
        map.spawn(floor());
        let blocker = map.spawn(Entity::new(
            EntityRole::Wall,
            "pillar",
            Vec2::new(200.0, 300.0),
            Vec2::new(20.0, 100.0),
        ));
        let hero = map.spawn(player(150.0, 368.0));
        map.apply_action(hero, &PlayerAction::MoveRight).unwrap();

        let mut touched = false;
        for _ in 0..50 {
            touched |= map
                .update(20)
                .iter()
                .any(|c| c.mover == hero && c.other == blocker);
        }

        assert!(touched);
        let hero = map.entity(hero).unwrap();
        assert!(hero.bounds().right() <= 200.0 + 0.01);
    }

    #[test]
    fn test_npc_wander_is_deterministic_per_seed() {
        let run = || {
            let mut map = map();
            map.spawn(floor());
            let npc = map.spawn(
                Entity::new(EntityRole::Npc, "slime", Vec2::new(250.0, 380.0), Vec2::new(16.0, 16.0))
                    .with_wander(),
            );
            settle(&mut map, 300);
            map.entity(npc).unwrap().position
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_snapshots_in_insertion_order() {
        let mut map = map();
        map.spawn(floor());
        map.spawn(player(10.0, 10.0));
        let roles: Vec<EntityRole> = map.snapshots().iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![EntityRole::Wall, EntityRole::Player]);
    }
}
