//! Axis-aligned rectangle math used by the spatial grid and collision code.
//!
//! All comparisons use half-open intervals `[min, max)`, so two boxes that only
//! share an edge do not intersect. An axis with zero extent is treated as the
//! single coordinate `min`, which keeps zero-size boxes queryable.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner
    pub min: Vec2,
    /// Width and height (never negative)
    pub size: Vec2,
}

impl Rect {
    /// Create a rectangle from a position and size
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_pos_size(Vec2::new(x, y), Vec2::new(width, height))
    }

    /// Create a rectangle from a top-left position and size
    pub fn from_pos_size(min: Vec2, size: Vec2) -> Self {
        Self {
            min,
            size: size.max(Vec2::ZERO),
        }
    }

    /// Zero-size rectangle at a point
    pub fn point(p: Vec2) -> Self {
        Self {
            min: p,
            size: Vec2::ZERO,
        }
    }

    #[inline]
    pub fn left(&self) -> f32 {
        self.min.x
    }

    #[inline]
    pub fn top(&self) -> f32 {
        self.min.y
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.min.x + self.size.x
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.min.y + self.size.y
    }

    /// Bottom-right corner
    #[inline]
    pub fn max(&self) -> Vec2 {
        self.min + self.size
    }

    /// Center point
    pub fn center(&self) -> Vec2 {
        self.min + self.size * 0.5
    }

    /// Whether either axis has zero extent
    pub fn is_degenerate(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Same rectangle moved by an offset
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            size: self.size,
        }
    }

    /// Whether two rectangles overlap
    pub fn intersects(&self, other: &Rect) -> bool {
        axis_overlaps(self.left(), self.right(), other.left(), other.right())
            && axis_overlaps(self.top(), self.bottom(), other.top(), other.bottom())
    }

    /// Whether a point lies inside the rectangle
    pub fn contains_point(&self, p: Vec2) -> bool {
        axis_contains(self.left(), self.right(), p.x) && axis_contains(self.top(), self.bottom(), p.y)
    }

    /// Width of the horizontal overlap between two rectangles (0 if none)
    pub fn horizontal_overlap(&self, other: &Rect) -> f32 {
        (self.right().min(other.right()) - self.left().max(other.left())).max(0.0)
    }

    /// Minimal translation that moves `self` out of `other`.
    ///
    /// Returns `None` when the rectangles do not intersect. The result is
    /// along a single axis, the one needing the smaller push.
    pub fn mtd(&self, other: &Rect) -> Option<Vec2> {
        if !self.intersects(other) {
            return None;
        }

        let push_left = other.left() - self.right();
        let push_right = other.right() - self.left();
        let push_up = other.top() - self.bottom();
        let push_down = other.bottom() - self.top();

        let dx = if push_right.abs() < push_left.abs() {
            push_right
        } else {
            push_left
        };
        let dy = if push_down.abs() < push_up.abs() {
            push_down
        } else {
            push_up
        };

        if dx.abs() < dy.abs() {
            Some(Vec2::new(dx, 0.0))
        } else {
            Some(Vec2::new(0.0, dy))
        }
    }
}

fn axis_overlaps(a_min: f32, a_max: f32, b_min: f32, b_max: f32) -> bool {
    if a_max <= a_min {
        return axis_contains(b_min, b_max, a_min);
    }
    if b_max <= b_min {
        return axis_contains(a_min, a_max, b_min);
    }
    a_min < b_max && b_min < a_max
}

fn axis_contains(min: f32, max: f32, v: f32) -> bool {
    if max <= min {
        v == min
    } else {
        v >= min && v < max
    }
}
