//! Pipette track, refreshed by geometric detection in every frame.

use ndarray::ArrayView2;
use tracing::trace;

use crate::config::PipetteConfig;
use crate::error::DetectionError;
use crate::tracker::track::{Strategy, Track};
use crate::vision::line_fit::LineFitter;
use crate::vision::segments::SegmentDetector;
use crate::vision::tip::{PipetteGeometry, TipLocator};

/// Keeps the walls and tip behind the current position.
#[derive(Debug, Clone, Default)]
pub struct Geometric {
    geometry: Option<PipetteGeometry>,
}

impl Strategy for Geometric {
    fn discard(&mut self) {
        self.geometry = None;
    }
}

pub type GeometricTrack = Track<Geometric>;

impl Track<Geometric> {
    pub fn geometric(stationary_threshold: u32) -> Self {
        Self::new(Geometric::default(), stationary_threshold)
    }

    /// Walls and tip of the current position.
    pub fn geometry(&self) -> Option<&PipetteGeometry> {
        self.strategy().geometry.as_ref()
    }

    /// Adopt a detection unless its tip moved no further than `deadband` pixels,
    /// in which case the current position is committed again.
    pub fn refresh(&mut self, geometry: PipetteGeometry, deadband: f32) {
        let next = geometry.tip.range;
        match self.range() {
            Some(current) if current.center_distance(&next) <= deadband => {
                trace!(?current, ?next, "pipette inside deadband");
                self.commit(Some(current));
            }
            _ => {
                self.strategy_mut().geometry = Some(geometry);
                self.commit(Some(next));
            }
        }
    }
}

/// Segment detection, wall fitting and tip location bundled into one call.
#[derive(Debug, Clone)]
pub struct PipetteDetector<D> {
    segments: D,
    fitter: LineFitter,
    locator: TipLocator,
}

impl<D: SegmentDetector> PipetteDetector<D> {
    pub fn new(segments: D, config: &PipetteConfig) -> Self {
        Self {
            segments,
            fitter: LineFitter::new(config),
            locator: TipLocator::new(config),
        }
    }

    /// Locate the pipette. `threshold` is the tip contrast sensitivity.
    pub fn detect(
        &mut self,
        frame: ArrayView2<'_, u8>,
        threshold: f32,
    ) -> Result<PipetteGeometry, DetectionError> {
        let segments = self.segments.detect(frame);
        let edges = self.fitter.fit(&segments)?;
        let tip = self.locator.locate(frame, &edges, threshold)?;
        Ok(PipetteGeometry { edges, tip })
    }

    pub fn locator(&self) -> &TipLocator {
        &self.locator
    }
}
