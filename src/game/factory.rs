//! Entity factory
//!
//! Entities are built from templates through an explicit registration table
//! keyed by the template's `kind` string. The table is filled once at startup;
//! there is no runtime type discovery.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GameError, Result};
use crate::game::entity::{Entity, EntityRole, TemplateId};

/// Static description of an entity type, as stored by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub id: TemplateId,
    pub name: String,
    /// Factory key ("player", "npc", "wall", "item", or a custom one)
    pub kind: String,
    pub width: f32,
    pub height: f32,
    /// Overrides the role default
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default = "default_true")]
    pub collides: bool,
}

fn default_true() -> bool {
    true
}

/// Builds an entity from a template at a position
pub type EntityConstructor = fn(&EntityTemplate, Vec2) -> Entity;

/// Registration table from kind key to constructor
#[derive(Debug, Clone, Default)]
pub struct EntityFactory {
    constructors: HashMap<String, EntityConstructor>,
}

impl EntityFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the built-in roles registered under their role keys
    pub fn with_defaults() -> Self {
        let mut constructors: HashMap<String, EntityConstructor> = HashMap::new();
        constructors.insert(EntityRole::Player.key().into(), build_player);
        constructors.insert(EntityRole::Npc.key().into(), build_npc);
        constructors.insert(EntityRole::Wall.key().into(), build_wall);
        constructors.insert(EntityRole::Item.key().into(), build_item);
        Self { constructors }
    }

    /// Register a constructor. Keys can only be registered once.
    pub fn register(&mut self, kind: impl Into<String>, constructor: EntityConstructor) -> Result<()> {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            return Err(GameError::DuplicateEntityKind(kind).into());
        }
        debug!(kind = %kind, "Registered entity constructor");
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    /// Build an entity from a template
    pub fn create(&self, template: &EntityTemplate, position: Vec2) -> Result<Entity> {
        let constructor = self
            .constructors
            .get(&template.kind)
            .ok_or_else(|| GameError::UnknownEntityKind(template.kind.clone()))?;
        Ok(constructor(template, position))
    }

    /// Registered keys, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

fn base(role: EntityRole, template: &EntityTemplate, position: Vec2) -> Entity {
    let mut entity = Entity::new(
        role,
        template.name.clone(),
        position,
        Vec2::new(template.width, template.height),
    )
    .with_template(template.id)
    .with_collision(template.collides);
    if let Some(weight) = template.weight {
        entity = entity.with_weight(weight);
    }
    entity
}

fn build_player(template: &EntityTemplate, position: Vec2) -> Entity {
    base(EntityRole::Player, template, position)
}

fn build_npc(template: &EntityTemplate, position: Vec2) -> Entity {
    base(EntityRole::Npc, template, position).with_wander()
}

fn build_wall(template: &EntityTemplate, position: Vec2) -> Entity {
    // Walls never move, whatever the template says
    base(EntityRole::Wall, template, position).with_weight(0.0)
}

fn build_item(template: &EntityTemplate, position: Vec2) -> Entity {
    base(EntityRole::Item, template, position)
}
