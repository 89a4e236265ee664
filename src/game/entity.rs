//! Entity module
//!
//! A single entity record covers every simulated object. What an entity is
//! (player, NPC, wall, item) is a tag, not a type, and behaviour that differs
//! per role lives in the systems that read the tag.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::spatial::{Rect, Spatial, SpatialKind};

/// Identifier of an entity within its map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of an entity template in the persistence layer
pub type TemplateId = u32;

/// What an entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRole {
    /// Controlled by a connected client
    Player,
    /// Server-controlled character
    Npc,
    /// Immovable collision geometry
    Wall,
    /// Loose object lying in the world
    Item,
}

impl EntityRole {
    /// Key used by the entity factory registration table
    pub fn key(self) -> &'static str {
        match self {
            EntityRole::Player => "player",
            EntityRole::Npc => "npc",
            EntityRole::Wall => "wall",
            EntityRole::Item => "item",
        }
    }

    pub fn spatial_kind(self) -> SpatialKind {
        match self {
            EntityRole::Player => SpatialKind::PLAYER,
            EntityRole::Npc => SpatialKind::NPC,
            EntityRole::Wall => SpatialKind::WALL,
            EntityRole::Item => SpatialKind::ITEM,
        }
    }

    pub fn is_character(self) -> bool {
        matches!(self, EntityRole::Player | EntityRole::Npc)
    }
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Random-walk state for server-controlled characters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WanderState {
    /// -1 left, 0 idle, 1 right
    pub direction: i8,
    /// Milliseconds until the next decision
    pub think_in_ms: u32,
}

/// A simulated object
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    /// Role tag
    pub role: EntityRole,
    /// Template the entity was created from
    pub template_id: Option<TemplateId>,
    /// Display name
    pub name: String,
    /// Top-left corner
    pub position: Vec2,
    /// Bounding box size
    pub size: Vec2,
    /// Units per millisecond
    pub velocity: Vec2,
    /// 0 means immovable
    pub weight: f32,
    /// Whether collision detection runs for this entity
    pub collides: bool,
    /// Wall currently supporting this entity
    pub standing_on: Option<EntityId>,
    /// AI state (NPCs only)
    pub wander: Option<WanderState>,
}

impl Entity {
    /// Create an entity with role defaults. Walls are immovable.
    pub fn new(role: EntityRole, name: impl Into<String>, position: Vec2, size: Vec2) -> Self {
        Self {
            id: EntityId(0),
            role,
            template_id: None,
            name: name.into(),
            position,
            size: size.max(Vec2::ZERO),
            velocity: Vec2::ZERO,
            weight: if role == EntityRole::Wall { 0.0 } else { 1.0 },
            collides: true,
            standing_on: None,
            wander: None,
        }
    }

    /// Assigned by the store on insert
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_collision(mut self, collides: bool) -> Self {
        self.collides = collides;
        self
    }

    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn with_wander(mut self) -> Self {
        self.wander = Some(WanderState::default());
        self
    }

    /// Whether physics moves this entity
    pub fn is_movable(&self) -> bool {
        self.weight > 0.0
    }

    pub fn is_standing(&self) -> bool {
        self.standing_on.is_some()
    }

    /// Read-only copy for renderers and persistence
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            template_id: self.template_id,
            role: self.role,
            name: self.name.clone(),
            position: self.position,
            size: self.size,
            velocity: self.velocity,
        }
    }
}

impl Spatial for Entity {
    fn bounds(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }

    fn spatial_kind(&self) -> SpatialKind {
        self.role.spatial_kind()
    }
}

/// Serializable view of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub template_id: Option<TemplateId>,
    pub role: EntityRole,
    pub name: String,
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
}

/// Owning storage for the entities of one map.
///
/// Ids only ever increase, so a removed entity's id is never handed out
/// again and stored state keyed by it stays its own. Iteration follows
/// insertion order.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Option<Entity>>,
    order: Vec<EntityId>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an entity and assign its id
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.slots.len() as u32);
        entity.id = id;
        self.slots.push(Some(entity));
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.slots.get_mut(id.0 as usize)?.take()?;
        self.order.retain(|&other| other != id);
        Some(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|&id| self.get(id))
    }

    /// Mutable access to two distinct entities at once
    pub fn pair_mut(&mut self, a: EntityId, b: EntityId) -> Option<(&mut Entity, &mut Entity)> {
        let (ai, bi) = (a.0 as usize, b.0 as usize);
        if ai == bi || ai >= self.slots.len() || bi >= self.slots.len() {
            return None;
        }

        let (first, second) = if ai < bi {
            let (left, right) = self.slots.split_at_mut(bi);
            (&mut left[ai], &mut right[0])
        } else {
            let (left, right) = self.slots.split_at_mut(ai);
            (&mut right[0], &mut left[bi])
        };

        match (first.as_mut(), second.as_mut()) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc(name: &str) -> Entity {
        Entity::new(EntityRole::Npc, name, Vec2::ZERO, Vec2::new(10.0, 20.0))
    }

    #[test]
    fn test_role_defaults() {
        let wall = Entity::new(EntityRole::Wall, "floor", Vec2::ZERO, Vec2::new(100.0, 10.0));
        assert!(!wall.is_movable());
        assert!(npc("bob").is_movable());
        assert_eq!(wall.spatial_kind(), SpatialKind::WALL);
    }

    #[test]
    fn test_bounds_follow_position() {
        let mut e = npc("bob");
        e.position = Vec2::new(5.0, 6.0);
        assert_eq!(e.bounds(), Rect::new(5.0, 6.0, 10.0, 20.0));
    }

    #[test]
    fn test_store_assigns_ids_and_keeps_order() {
        let mut store = EntityStore::new();
        let a = store.insert(npc("a"));
        let b = store.insert(npc("b"));
        let c = store.insert(npc("c"));
        assert_eq!(store.get(b).unwrap().id(), b);

        store.remove(b);
        assert_eq!(store.ids(), &[a, c]);

        // A removed id is never handed out again
        let d = store.insert(npc("d"));
        assert_ne!(d, b);
        assert!(d > c);
        assert!(store.get(b).is_none());
        let names: Vec<&str> = store.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_remove_missing() {
        let mut store = EntityStore::new();
        assert!(store.remove(EntityId(3)).is_none());
        let a = store.insert(npc("a"));
        assert!(store.remove(a).is_some());
        assert!(store.remove(a).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_pair_mut() {
        let mut store = EntityStore::new();
        let a = store.insert(npc("a"));
        let b = store.insert(npc("b"));

        let (x, y) = store.pair_mut(b, a).unwrap();
        x.velocity.x = 1.0;
        y.velocity.x = -1.0;
        assert_eq!(store.get(b).unwrap().velocity.x, 1.0);
        assert_eq!(store.get(a).unwrap().velocity.x, -1.0);

        assert!(store.pair_mut(a, a).is_none());
        assert!(store.pair_mut(a, EntityId(9)).is_none());
        store.remove(b);
        assert!(store.pair_mut(a, b).is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut store = EntityStore::new();
        let id = store.insert(npc("slime").with_template(4));
        let snapshot = store.get(id).unwrap().snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: EntitySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(json.contains("\"npc\""));
    }
}
