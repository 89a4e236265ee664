//! Spatial indexing module
//!
//! Contains:
//! - `geometry` - Axis-aligned rectangle math
//! - `grid` - Segment grid for range, point and kind-filtered queries

pub mod geometry;
pub mod grid;

use bitflags::bitflags;

pub use geometry::Rect;
pub use grid::{CellCoord, SpatialGrid, SpatialQuery, MIN_SEGMENT_SIZE};

bitflags! {
    /// Capability tags used to filter spatial queries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpatialKind: u8 {
        const PLAYER = 0b0001;
        const NPC = 0b0010;
        const WALL = 0b0100;
        const ITEM = 0b1000;
        const CHARACTER = Self::PLAYER.bits() | Self::NPC.bits();
    }
}

/// Anything that occupies an axis-aligned area of a map.
///
/// Used only for indexing and queries; implementing it says nothing about
/// who owns the object.
pub trait Spatial {
    /// Current bounding box
    fn bounds(&self) -> Rect;

    /// Kind tag used for filtered queries
    fn spatial_kind(&self) -> SpatialKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_kind_covers_players_and_npcs() {
        assert!(SpatialKind::CHARACTER.contains(SpatialKind::PLAYER));
        assert!(SpatialKind::CHARACTER.contains(SpatialKind::NPC));
        assert!(!SpatialKind::CHARACTER.intersects(SpatialKind::WALL | SpatialKind::ITEM));
    }
}
