use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in image pixel space.
///
/// The rectangle covers `[left, left + width) x [top, top + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Build a rectangle from a box anchored on its centre point (YOLO style).
    pub fn from_center(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self::new(
            center_x - width / 2.0,
            center_y - height / 2.0,
            width,
            height,
        )
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// `true` if this rectangle has no area or contains non-finite components.
    pub fn is_degenerate(&self) -> bool {
        !(self.left.is_finite()
            && self.top.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Whether the two rectangles intersect with a positive area.
    ///
    /// Rectangles which only touch along an edge do not overlap, and degenerate rectangles never
    /// overlap anything.
    pub fn overlaps(&self, other: &Rect) -> bool {
        if self.is_degenerate() || other.is_degenerate() {
            return false;
        }

        let overlaps_h = self.left.max(other.left) < self.right().min(other.right());
        let overlaps_v = self.top.max(other.top) < self.bottom().min(other.bottom());

        overlaps_h && overlaps_v
    }
}
