//! Game module
//!
//! This module contains the simulation core of the DemoGame server:
//! - World management (fixed-step scheduler, maps, autosave)
//! - Entities, templates and the factory building them
//! - Collision and standing resolution
//! - World events for observers

pub mod clock;
pub mod collision;
pub mod data;
pub mod entity;
pub mod events;
pub mod factory;
pub mod map;
pub mod persistence;
pub mod scheduler;
pub mod world;

pub use clock::{ManualClock, SystemClock, TickCount, TimeSource};
pub use entity::{Entity, EntityId, EntityRole};
pub use map::{Map, MapId, PlayerAction};
pub use world::{GameWorld, WorldSettings};
