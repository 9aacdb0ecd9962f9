//! Locating the pipette tip and probing the lumen along the centerline.

use nalgebra::{Point2, Vector2};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::config::PipetteConfig;
use crate::error::DetectionError;
use crate::tracker::BoundingRange;
use crate::vision::frame::pixel;
use crate::vision::line_fit::{EdgeLine, PipetteEdges};

/// Result of a tip search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipetteTip {
    /// Column of the tip on the centerline
    pub x: i64,
    /// Tip projected onto both walls
    pub range: BoundingRange,
    /// Strongest contrast seen during the walk
    pub contrast: f32,
}

/// Everything known about the pipette from one successful detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipetteGeometry {
    pub edges: PipetteEdges,
    pub tip: PipetteTip,
}

/// Walks the centerline comparing pixels a fixed distance apart.
#[derive(Debug, Clone)]
pub struct TipLocator {
    scan_start_x: usize,
    comparison_distance: usize,
}

impl TipLocator {
    pub fn new(config: &PipetteConfig) -> Self {
        Self {
            scan_start_x: config.scan_start_x,
            comparison_distance: config.comparison_distance.max(1),
        }
    }

    /// Find the tip: the strongest contrast step along the centerline, stopping
    /// early at the first step stronger than `threshold`.
    pub fn locate(
        &self,
        frame: ArrayView2<'_, u8>,
        edges: &PipetteEdges,
        threshold: f32,
    ) -> Result<PipetteTip, DetectionError> {
        let centerline = edges.centerline();
        let width = frame.ncols();
        let d = self.comparison_distance;

        let mut best: Option<(i64, f32)> = None;
        for x in self.scan_start_x..width.saturating_sub(d) {
            let x = x as i64;
            let Some(contrast) = self.contrast_at(&frame, &centerline, x) else {
                continue;
            };
            if best.is_none_or(|(_, c)| contrast > c) {
                best = Some((x + (d / 2) as i64, contrast));
                if contrast > threshold {
                    break;
                }
            }
        }

        let (tip_x, contrast) = best.ok_or(DetectionError::CenterlineOutOfFrame)?;
        Ok(PipetteTip {
            x: tip_x,
            range: tip_range(edges, tip_x as f32),
            contrast,
        })
    }

    /// First step between `start` and `end` (inclusive, either direction) whose
    /// contrast exceeds `threshold`, reported at the middle of the compared pair.
    pub fn probe(
        &self,
        frame: ArrayView2<'_, u8>,
        centerline: &EdgeLine,
        start: i64,
        end: i64,
        threshold: f32,
    ) -> Option<i64> {
        let step = if end >= start { 1 } else { -1 };
        let mut x = start;
        loop {
            if self
                .contrast_at(&frame, centerline, x)
                .is_some_and(|c| c > threshold)
            {
                return Some(x + (self.comparison_distance / 2) as i64);
            }
            if x == end {
                return None;
            }
            x += step;
        }
    }

    fn contrast_at(&self, frame: &ArrayView2<'_, u8>, line: &EdgeLine, x: i64) -> Option<f32> {
        let far = x + self.comparison_distance as i64;
        let near_px = pixel(frame, x, line.y_at(x as f32).floor() as i64)?;
        let far_px = pixel(frame, far, line.y_at(far as f32).floor() as i64)?;
        Some((f32::from(near_px) - f32::from(far_px)).abs())
    }
}

/// Project a centerline point perpendicular onto both walls and bound the two feet.
pub fn tip_range(edges: &PipetteEdges, tip_x: f32) -> BoundingRange {
    let centerline = edges.centerline();
    let m = centerline.gradient;
    let on_center = Point2::new(tip_x, centerline.y_at(tip_x));
    let normal = Vector2::new(-m, 1.0);

    let foot = |edge: &EdgeLine| {
        let t = (edge.gradient * on_center.x + edge.offset - on_center.y) / (1.0 + edge.gradient * m);
        on_center + normal * t
    };
    let upper = foot(&edges.upper);
    let lower = foot(&edges.lower);

    BoundingRange::from_tlbr(upper.x, upper.y, lower.x, lower.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn horizontal_edges() -> PipetteEdges {
        PipetteEdges {
            upper: EdgeLine::new(0.0, 100.0),
            lower: EdgeLine::new(0.0, 140.0),
        }
    }

    /// Dark lumen band 100..=140 left of `boundary`, bright elsewhere.
    fn frame_with_boundary(boundary: usize) -> Array2<u8> {
        Array2::from_shape_fn((200, 240), |(y, x)| {
            if (100..=140).contains(&y) && x < boundary { 50 } else { 200 }
        })
    }

    #[test]
    fn test_locates_tip_and_range() {
        let locator = TipLocator::new(&PipetteConfig::default());
        let frame = frame_with_boundary(63);
        let tip = locator.locate(frame.view(), &horizontal_edges(), 20.0).unwrap();
        assert_eq!(tip.x, 60);
        assert_eq!(tip.contrast, 150.0);
        assert_eq!(tip.range, BoundingRange::new(60.0, 100.0, 0.0, 40.0));
    }

    #[test]
    fn test_uses_best_contrast_when_threshold_not_reached() {
        let locator = TipLocator::new(&PipetteConfig::default());
        let frame = frame_with_boundary(100);
        let tip = locator.locate(frame.view(), &horizontal_edges(), 255.0).unwrap();
        assert_eq!(tip.x, 97);
    }

    #[test]
    fn test_centerline_outside_frame() {
        let locator = TipLocator::new(&PipetteConfig::default());
        let frame = Array2::<u8>::zeros((50, 240));
        let err = locator.locate(frame.view(), &horizontal_edges(), 20.0);
        assert_eq!(err, Err(DetectionError::CenterlineOutOfFrame));
    }

    #[test]
    fn test_probe_both_directions() {
        let locator = TipLocator::new(&PipetteConfig::default());
        // bright body between columns 60 and 110 inside the lumen
        let frame = Array2::from_shape_fn((200, 240), |(y, x)| {
            if (100..=140).contains(&y) && (60..110).contains(&x) { 150 } else { 50 }
        });
        let centerline = horizontal_edges().centerline();
        assert_eq!(locator.probe(frame.view(), &centerline, 5, 140, 10.0), Some(57));
        assert_eq!(locator.probe(frame.view(), &centerline, 140, 5, 10.0), Some(111));
        assert_eq!(locator.probe(frame.view(), &centerline, 5, 40, 10.0), None);
    }

    #[test]
    fn test_sloped_tip_range_is_perpendicular() {
        let edges = PipetteEdges {
            upper: EdgeLine::new(1.0, 0.0),
            lower: EdgeLine::new(1.0, 20.0),
        };
        let range = tip_range(&edges, 50.0);
        // center (50, 60); feet at (55, 55) and (45, 65)
        assert!((range.x - 45.0).abs() < 1e-4);
        assert!((range.y - 55.0).abs() < 1e-4);
        assert!((range.width - 10.0).abs() < 1e-4);
        assert!((range.height - 10.0).abs() < 1e-4);
    }
}
