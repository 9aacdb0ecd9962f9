//! Builder for turning user selections into a `BoundingRange`.

use crate::tracker::BoundingRange;

/// Normalizes a selection given as a drag, corners or TLWH.
///
/// Drags may run in any direction; the result always has its origin at the
/// top-left and a non-negative extent.
#[derive(Debug, Clone, Default)]
pub struct SelectionBuilder {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl SelectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drag starting at `(x, y)` and extending by `(dx, dy)`, either of which may be negative.
    pub fn drag(mut self, x: f32, y: f32, dx: f32, dy: f32) -> Self {
        self.x1 = x;
        self.y1 = y;
        self.x2 = x + dx;
        self.y2 = y + dy;
        self
    }

    /// Set the selection in TLBR format (x1, y1, x2, y2), corners in any order.
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set the selection in TLWH format (left, top, width, height).
    pub fn tlwh(self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.drag(x, y, w, h)
    }

    /// Scale from display coordinates to frame pixels.
    pub fn scaled(mut self, factor: f32) -> Self {
        self.x1 *= factor;
        self.y1 *= factor;
        self.x2 *= factor;
        self.y2 *= factor;
        self
    }

    /// The normalized range, `None` when the selection has no area.
    pub fn build(self) -> Option<BoundingRange> {
        let range = BoundingRange::from_tlbr(self.x1, self.y1, self.x2, self.y2);
        (!range.is_degenerate()).then_some(range)
    }
}
