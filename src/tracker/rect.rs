/// Axis-aligned pixel range covered by a track.
///
/// Stored as TLWH: top-left x, top-left y, width, height. A width or height of
/// zero is valid and represents a line track (the pipette tip is a vertical line
/// across the lumen when the pipette is horizontal).
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingRange {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the range
    pub width: f32,
    /// Height of the range
    pub height: f32,
}

impl BoundingRange {
    /// Create a range from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a range from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    ///
    /// Corners may be given in either order; the result always has non-negative extent.
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (left, right) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (top, bottom) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Convert to TLWH format: (x, y, width, height).
    #[inline]
    pub fn to_tlwh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Get the center point of the range.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// True when either dimension is zero (or negative).
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Grow both dimensions by `fraction` of their size, keeping the center fixed.
    pub fn grown(&self, fraction: f32) -> Self {
        let dw = self.width * fraction;
        let dh = self.height * fraction;
        Self {
            x: self.x - dw / 2.0,
            y: self.y - dh / 2.0,
            width: self.width + dw,
            height: self.height + dh,
        }
    }

    /// Whether the vertical spans of the two ranges intersect (open interval).
    #[inline]
    pub fn overlaps_vertically(&self, other: &Self) -> bool {
        self.y < other.y + other.height && self.y + self.height > other.y
    }

    /// Euclidean distance between the two centers.
    pub fn center_distance(&self, other: &Self) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).hypot(ay - by)
    }

    /// Manhattan displacement of the top-left corner, used for stationary detection.
    #[inline]
    pub fn corner_displacement(&self, other: &Self) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}
