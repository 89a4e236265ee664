//! Collision detection and resolution
//!
//! Detection uses the map's spatial grid. Reactions go through an injected
//! [`CollisionHandler`] so both sides of a contact get a say: the mover via
//! `collide_into`, the struck entity via `collide_from`.

use glam::Vec2;
use tracing::trace;

use crate::game::entity::{Entity, EntityId, EntityStore};
use crate::spatial::{Rect, Spatial, SpatialGrid, SpatialKind};

/// Height of the strip under an entity searched for supporting walls
pub const STANDING_PROBE: f32 = 1.0;

/// Slack allowed between an entity's bottom and a supporting surface
pub const STANDING_TOLERANCE: f32 = 0.01;

/// Reaction to a contact between two entities
pub trait CollisionHandler: Send {
    /// `mover` ran into `other`; `displacement` would push the mover out
    fn collide_into(&mut self, mover: &mut Entity, other: &mut Entity, displacement: Vec2);

    /// `struck` was hit by `mover`; `displacement` is the same vector the
    /// mover received
    fn collide_from(&mut self, struck: &mut Entity, mover: &mut Entity, displacement: Vec2);
}

/// Default reactions: movable entities are blocked by walls
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCollision;

impl CollisionHandler for StandardCollision {
    fn collide_into(&mut self, mover: &mut Entity, other: &mut Entity, displacement: Vec2) {
        if other.is_movable() || !mover.is_movable() {
            return;
        }

        mover.position += displacement;

        // Cancel only the velocity pointing into the wall
        if displacement.x * mover.velocity.x < 0.0 {
            mover.velocity.x = 0.0;
        }
        if displacement.y * mover.velocity.y < 0.0 {
            mover.velocity.y = 0.0;
        }
    }

    fn collide_from(&mut self, _struck: &mut Entity, _mover: &mut Entity, _displacement: Vec2) {}
}

/// Runs collision checks against a map's entities and grid
pub struct CollisionResolver {
    handler: Box<dyn CollisionHandler>,
}

impl CollisionResolver {
    pub fn new(handler: impl CollisionHandler + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Detect and react to every contact of entity `id`.
    ///
    /// Returns the ids that were hit, in ascending order. A missing entity or
    /// one with collision disabled is a no-op. Entities with collision
    /// disabled are never hit either.
    pub fn check_collisions(
        &mut self,
        entities: &mut EntityStore,
        grid: &mut SpatialGrid<EntityId>,
        id: EntityId,
    ) -> Vec<EntityId> {
        let Some(mover) = entities.get(id) else {
            return Vec::new();
        };
        if !mover.collides {
            return Vec::new();
        }

        let mut candidates: Vec<EntityId> = grid.query(mover.bounds()).filter(|&o| o != id).collect();
        candidates.sort_unstable();

        let mut hits = Vec::new();
        for other_id in candidates {
            let Some((mover, other)) = entities.pair_mut(id, other_id) else {
                continue;
            };
            if !other.collides {
                continue;
            }
            // An earlier push may already have separated them
            let Some(displacement) = mover.bounds().mtd(&other.bounds()) else {
                continue;
            };

            self.handler.collide_into(mover, other, displacement);
            self.handler.collide_from(other, mover, displacement);

            let (mover_bounds, other_bounds) = (mover.bounds(), other.bounds());
            grid.update(id, mover_bounds);
            grid.update(other_id, other_bounds);

            trace!(
                mover = %id,
                other = %other_id,
                dx = displacement.x,
                dy = displacement.y,
                "Collision"
            );
            hits.push(other_id);
        }
        hits
    }
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(StandardCollision)
    }
}

impl std::fmt::Debug for CollisionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionResolver").finish_non_exhaustive()
    }
}

/// Wall directly beneath an entity, if any.
///
/// A wall qualifies when its top lies within [`STANDING_PROBE`] below the
/// entity's bottom edge and it overlaps the entity horizontally. Among
/// several candidates the one with the widest horizontal overlap wins, then
/// the highest surface, then the lowest id.
pub fn find_standing_on(grid: &SpatialGrid<EntityId>, entity: &Entity) -> Option<EntityId> {
    let bounds = entity.bounds();
    let probe = Rect::new(
        bounds.left(),
        bounds.bottom() - STANDING_TOLERANCE,
        bounds.size.x,
        STANDING_PROBE + STANDING_TOLERANCE,
    );

    let mut best: Option<(EntityId, f32, f32)> = None;
    for wall_id in grid.query_kind(probe, SpatialKind::WALL) {
        if wall_id == entity.id() {
            continue;
        }
        let Some(wall) = grid.bounds_of(wall_id) else {
            continue;
        };
        let top = wall.top();
        if top < bounds.bottom() - STANDING_TOLERANCE || top >= bounds.bottom() + STANDING_PROBE {
            continue;
        }
        let overlap = bounds.horizontal_overlap(&wall);
        if overlap <= 0.0 {
            continue;
        }

        let better = match best {
            None => true,
            Some((best_id, best_overlap, best_top)) => {
                overlap > best_overlap
                    || (overlap == best_overlap && top < best_top)
                    || (overlap == best_overlap && top == best_top && wall_id < best_id)
            }
        };
        if better {
            best = Some((wall_id, overlap, top));
        }
    }
    best.map(|(id, _, _)| id)
}
