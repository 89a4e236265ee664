//! Grid-partitioned spatial index
//!
//! The map area is split into square segments. Every indexed key is present in
//! exactly the segments its bounding box overlaps, so range and point queries
//! only look at the segments under the query area.

use std::collections::{hash_set, HashMap, HashSet};
use std::hash::Hash;

use glam::Vec2;
use tracing::trace;

use super::{Rect, SpatialKind};
use crate::error::SpatialError;

/// Smallest allowed segment size, in world units
pub const MIN_SEGMENT_SIZE: u32 = 4;

/// Coordinates of one grid segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Inclusive block of segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRange {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl CellRange {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    fn cells(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone)]
struct GridEntry {
    bounds: Rect,
    kind: SpatialKind,
    cells: CellRange,
}

/// Spatial index over keys with axis-aligned bounds.
///
/// The grid never owns the indexed objects; it only remembers their key,
/// last known bounds and kind. Owners must call [`SpatialGrid::update`]
/// whenever an object moves or resizes.
#[derive(Debug, Clone)]
pub struct SpatialGrid<K> {
    segment_size: f32,
    width: u32,
    height: u32,
    extent: Rect,
    segments: Vec<HashSet<K>>,
    entries: HashMap<K, GridEntry>,
}

impl<K: Copy + Eq + Hash> SpatialGrid<K> {
    /// Create a grid covering `(0, 0)..area` with the given segment size
    pub fn new(area: Vec2, segment_size: u32) -> Result<Self, SpatialError> {
        if segment_size < MIN_SEGMENT_SIZE {
            return Err(SpatialError::SegmentTooSmall {
                size: segment_size,
                min: MIN_SEGMENT_SIZE,
            });
        }
        if !(area.x.is_finite() && area.y.is_finite() && area.x > 0.0 && area.y > 0.0) {
            return Err(SpatialError::InvalidArea {
                width: area.x,
                height: area.y,
            });
        }

        let segment = segment_size as f32;
        let width = (area.x / segment).ceil().max(1.0) as u32;
        let height = (area.y / segment).ceil().max(1.0) as u32;
        let segments = (0..width as usize * height as usize)
            .map(|_| HashSet::new())
            .collect();

        trace!(width, height, segment_size, "Created spatial grid");

        Ok(Self {
            segment_size: segment,
            width,
            height,
            extent: Rect::from_pos_size(Vec2::ZERO, area),
            segments,
            entries: HashMap::new(),
        })
    }

    /// Segment size in world units
    pub fn segment_size(&self) -> u32 {
        self.segment_size as u32
    }

    /// Grid size in segments (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Last bounds recorded for a key
    pub fn bounds_of(&self, key: K) -> Option<Rect> {
        self.entries.get(&key).map(|e| e.bounds)
    }

    pub fn kind_of(&self, key: K) -> Option<SpatialKind> {
        self.entries.get(&key).map(|e| e.kind)
    }

    /// Segments a key is currently stored in
    pub fn occupied_cells(&self, key: K) -> Vec<CellCoord> {
        self.entries
            .get(&key)
            .map(|e| e.cells.cells().map(|(x, y)| CellCoord::new(x, y)).collect())
            .unwrap_or_default()
    }

    /// Index a key. Adding a key that is already present updates it instead.
    ///
    /// Returns `true` if the key was not indexed before.
    pub fn add(&mut self, key: K, bounds: Rect, kind: SpatialKind) -> bool {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.kind = kind;
            self.update(key, bounds);
            return false;
        }

        let cells = self.covered_cells(&bounds);
        for (x, y) in cells.cells() {
            let index = self.index(x, y);
            self.segments[index].insert(key);
        }
        self.entries.insert(
            key,
            GridEntry {
                bounds,
                kind,
                cells,
            },
        );
        true
    }

    /// Remove a key from every segment it occupies
    pub fn remove(&mut self, key: K) -> bool {
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };
        for (x, y) in entry.cells.cells() {
            let index = self.index(x, y);
            self.segments[index].remove(&key);
        }
        true
    }

    /// Record new bounds for a key and fix up its segment membership.
    ///
    /// Only segments that changed are touched, so calling this with unchanged
    /// bounds is a no-op. Returns `false` if the key is not indexed.
    pub fn update(&mut self, key: K, bounds: Rect) -> bool {
        let new_cells = self.covered_cells(&bounds);
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        let old_cells = entry.cells;
        entry.bounds = bounds;
        entry.cells = new_cells;

        if old_cells == new_cells {
            return true;
        }

        for (x, y) in old_cells.cells() {
            if !new_cells.contains(x, y) {
                let index = (y * self.width + x) as usize;
                self.segments[index].remove(&key);
            }
        }
        for (x, y) in new_cells.cells() {
            if !old_cells.contains(x, y) {
                let index = (y * self.width + x) as usize;
                self.segments[index].insert(key);
            }
        }
        true
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        for segment in &mut self.segments {
            segment.clear();
        }
        self.entries.clear();
    }

    /// Lazily yield every key whose bounds intersect `area`
    pub fn query(&self, area: Rect) -> SpatialQuery<'_, K> {
        self.query_kind(area, SpatialKind::all())
    }

    /// Lazily yield keys of the given kinds whose bounds intersect `area`.
    ///
    /// Each key is yielded once, in no particular order. An area entirely
    /// outside the grid yields nothing.
    pub fn query_kind(&self, area: Rect, kinds: SpatialKind) -> SpatialQuery<'_, K> {
        let range = if area.intersects(&self.extent) {
            Some(self.covered_cells(&area))
        } else {
            None
        };
        SpatialQuery {
            grid: self,
            area,
            kinds,
            range,
            cursor: range.map(|r| (r.x0, r.y0)),
            current: None,
        }
    }

    /// First key found whose bounds contain `point`
    pub fn first_at(&self, point: Vec2) -> Option<K> {
        self.first_at_kind(point, SpatialKind::all())
    }

    /// First key of the given kinds whose bounds contain `point`
    pub fn first_at_kind(&self, point: Vec2, kinds: SpatialKind) -> Option<K> {
        if !self.extent.contains_point(point) {
            return None;
        }
        let cells = self.covered_cells(&Rect::point(point));
        let index = self.index(cells.x0, cells.y0);
        self.segments[index].iter().copied().find(|key| {
            self.entries
                .get(key)
                .is_some_and(|e| e.kind.intersects(kinds) && e.bounds.contains_point(point))
        })
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    fn clamp_cell(&self, cell: i64, cells: u32) -> u32 {
        cell.clamp(0, cells as i64 - 1) as u32
    }

    /// Segments overlapped by `bounds`, clamped into the grid. Always at
    /// least the segment holding the top-left corner.
    fn covered_cells(&self, bounds: &Rect) -> CellRange {
        let seg = self.segment_size;
        let first_x = (bounds.left() / seg).floor() as i64;
        let first_y = (bounds.top() / seg).floor() as i64;
        let last_x = if bounds.size.x > 0.0 {
            ((bounds.right() / seg).ceil() as i64 - 1).max(first_x)
        } else {
            first_x
        };
        let last_y = if bounds.size.y > 0.0 {
            ((bounds.bottom() / seg).ceil() as i64 - 1).max(first_y)
        } else {
            first_y
        };

        CellRange {
            x0: self.clamp_cell(first_x, self.width),
            y0: self.clamp_cell(first_y, self.height),
            x1: self.clamp_cell(last_x, self.width),
            y1: self.clamp_cell(last_y, self.height),
        }
    }
}

/// Lazy result of a grid range query.
///
/// Borrows the grid, so the grid cannot change while a query is alive.
/// Running the same query again re-evaluates the current state.
pub struct SpatialQuery<'a, K> {
    grid: &'a SpatialGrid<K>,
    area: Rect,
    kinds: SpatialKind,
    range: Option<CellRange>,
    cursor: Option<(u32, u32)>,
    current: Option<(u32, u32, hash_set::Iter<'a, K>)>,
}

impl<'a, K: Copy + Eq + Hash> SpatialQuery<'a, K> {
    fn next_segment(&mut self) -> Option<(u32, u32)> {
        let range = self.range?;
        let (x, y) = self.cursor?;
        self.cursor = if x < range.x1 {
            Some((x + 1, y))
        } else if y < range.y1 {
            Some((range.x0, y + 1))
        } else {
            None
        };
        Some((x, y))
    }
}

impl<'a, K: Copy + Eq + Hash> Iterator for SpatialQuery<'a, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        loop {
            if let Some((x, y, iter)) = &mut self.current {
                let range = self.range?;
                for key in iter.by_ref() {
                    let Some(entry) = self.grid.entries.get(key) else {
                        continue;
                    };
                    if !entry.kind.intersects(self.kinds) || !entry.bounds.intersects(&self.area)
                    {
                        continue;
                    }
                    // Yield only from the first segment shared by the entry and
                    // the query range, so multi-segment entries appear once.
                    let owner_x = entry.cells.x0.max(range.x0);
                    let owner_y = entry.cells.y0.max(range.y0);
                    if (owner_x, owner_y) != (*x, *y) {
                        continue;
                    }
                    return Some(*key);
                }
                self.current = None;
            }

            let (x, y) = self.next_segment()?;
            let index = self.grid.index(x, y);
            self.current = Some((x, y, self.grid.segments[index].iter()));
        }
    }
}
