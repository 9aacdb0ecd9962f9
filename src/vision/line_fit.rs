//! Fitting the pipette's wall pair from detected line segments.

use tracing::trace;

use crate::config::PipetteConfig;
use crate::error::DetectionError;
use crate::vision::segments::LineSegment;

/// A line `y = gradient * x + offset`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeLine {
    pub gradient: f32,
    pub offset: f32,
}

impl EdgeLine {
    pub const fn new(gradient: f32, offset: f32) -> Self {
        Self { gradient, offset }
    }

    /// Line with the given gradient through the segment's end point.
    pub fn through(segment: &LineSegment, gradient: f32) -> Result<Self, DetectionError> {
        if segment.x1 == segment.x2 {
            return Err(DetectionError::UndefinedGradient);
        }
        let offset = segment.y2 as f32 - gradient * segment.x2 as f32;
        Ok(Self { gradient, offset })
    }

    #[inline]
    pub fn y_at(&self, x: f32) -> f32 {
        self.gradient * x + self.offset
    }
}

/// Upper (smaller y) and lower wall of the pipette.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipetteEdges {
    pub upper: EdgeLine,
    pub lower: EdgeLine,
}

impl PipetteEdges {
    /// Line midway between the walls.
    pub fn centerline(&self) -> EdgeLine {
        EdgeLine {
            gradient: (self.upper.gradient + self.lower.gradient) / 2.0,
            offset: (self.upper.offset + self.lower.offset) / 2.0,
        }
    }

    /// Vertical distance between the walls.
    pub fn width(&self) -> f32 {
        (self.lower.offset - self.upper.offset).abs()
    }
}

/// Picks the two pipette walls out of a bag of segments.
#[derive(Debug, Clone)]
pub struct LineFitter {
    gradient_tolerance: f32,
    midline_tolerance: f32,
}

impl LineFitter {
    pub fn new(config: &PipetteConfig) -> Self {
        Self {
            gradient_tolerance: config.gradient_tolerance,
            midline_tolerance: config.midline_tolerance_px,
        }
    }

    pub fn fit(&self, segments: &[LineSegment]) -> Result<PipetteEdges, DetectionError> {
        if segments.len() < 2 {
            return Err(DetectionError::TooFewSegments {
                found: segments.len(),
            });
        }

        let sloped: Vec<(&LineSegment, f32)> = segments
            .iter()
            .filter_map(|s| s.gradient().map(|g| (s, g)))
            .collect();
        let dominant =
            dominant_gradient(sloped.iter().map(|&(_, g)| g)).ok_or(DetectionError::NoDominantOrientation)?;
        let median = median(sloped.iter().map(|(s, _)| s.mid_y()).collect());

        let survivors: Vec<&LineSegment> = sloped
            .iter()
            .filter(|(s, g)| {
                (g - dominant).abs() <= self.gradient_tolerance
                    && (s.mid_y() - median).abs() <= self.midline_tolerance
            })
            .map(|&(s, _)| s)
            .collect();
        if survivors.len() < 2 {
            return Err(DetectionError::InsufficientEdges {
                found: survivors.len(),
            });
        }

        let mut upper = survivors[0];
        let mut lower = survivors[0];
        for &segment in &survivors[1..] {
            if segment.mid_y() < upper.mid_y() {
                upper = segment;
            }
            if segment.mid_y() > lower.mid_y() {
                lower = segment;
            }
        }

        let edges = PipetteEdges {
            upper: EdgeLine::through(upper, dominant)?,
            lower: EdgeLine::through(lower, dominant)?,
        };
        trace!(
            dominant,
            median,
            survivors = survivors.len(),
            upper = edges.upper.offset,
            lower = edges.lower.offset,
            "fitted pipette walls"
        );
        Ok(edges)
    }
}

/// Most frequent gradient after rounding to one decimal.
///
/// Ties go to the bucket that was seen first.
pub fn dominant_gradient(gradients: impl IntoIterator<Item = f32>) -> Option<f32> {
    let mut buckets: Vec<(i32, usize)> = Vec::new();
    for gradient in gradients {
        let key = (gradient * 10.0).round() as i32;
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => buckets.push((key, 1)),
        }
    }

    let mut best: Option<(i32, usize)> = None;
    for &(key, count) in &buckets {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((key, count));
        }
    }
    best.map(|(key, _)| key as f32 / 10.0)
}

fn median(mut values: Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
