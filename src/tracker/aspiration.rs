//! Free cell → aspirating → fully aspirated.
//!
//! The stage enum owns exactly one cell-related track at a time: the free cell
//! while nothing is inside the pipette, a derived line track while the cell is
//! being drawn in, and a second correlation track over the aspirated body once
//! the whole cell is inside the lumen.

use ndarray::ArrayView2;
use tracing::{debug, info, warn};

use crate::config::{AspirationConfig, CorrelationConfig, TrackerConfig};
use crate::error::TrackError;
use crate::tracker::correlation::CorrelationTrack;
use crate::tracker::geometric::GeometricTrack;
use crate::tracker::rect::BoundingRange;
use crate::tracker::track::{Derived, Track};
use crate::tracker::track_state::{AspirationPhase, TrackState};
use crate::vision::filter::FilterFactory;
use crate::vision::tip::TipLocator;

/// The cell-related track owned by each aspiration phase.
pub enum Stage<F> {
    Free { cell: CorrelationTrack<F> },
    Aspirating { body: Track<Derived> },
    FullyAspirated { body: CorrelationTrack<F> },
}

impl<F> Stage<F> {
    pub fn phase(&self) -> AspirationPhase {
        match self {
            Self::Free { .. } => AspirationPhase::NotAspirating,
            Self::Aspirating { .. } => AspirationPhase::Aspirating,
            Self::FullyAspirated { .. } => AspirationPhase::FullyAspirated,
        }
    }
}

/// Outcome of one aspiration step.
enum Step<F> {
    Stay,
    Abandon,
    Full(CorrelationTrack<F>),
}

/// Drives the cell through the aspiration phases and owns the matching track.
pub struct AspirationStateMachine<M: FilterFactory> {
    stage: Stage<M::Filter>,
    /// Final state of an aspiration track dropped this frame
    retired: Option<TrackState>,
    factory: M,
    config: AspirationConfig,
    correlation: CorrelationConfig,
    stationary_threshold: u32,
}

impl<M: FilterFactory> AspirationStateMachine<M> {
    pub fn new(factory: M, config: &TrackerConfig) -> Self {
        Self {
            stage: Stage::Free {
                cell: CorrelationTrack::correlation(config.stationary_threshold),
            },
            retired: None,
            factory,
            config: config.aspiration.clone(),
            correlation: config.correlation.clone(),
            stationary_threshold: config.stationary_threshold,
        }
    }

    pub fn phase(&self) -> AspirationPhase {
        self.stage.phase()
    }

    pub fn stage(&self) -> &Stage<M::Filter> {
        &self.stage
    }

    /// Free cell track state; inactive while aspirating.
    pub fn cell_state(&self) -> TrackState {
        match &self.stage {
            Stage::Free { cell } => cell.state().clone(),
            _ => TrackState::default(),
        }
    }

    /// Aspiration track state, including one that was dropped this frame.
    pub fn aspiration_state(&self) -> TrackState {
        match &self.stage {
            Stage::Aspirating { body } => body.state().clone(),
            Stage::FullyAspirated { body } => body.state().clone(),
            Stage::Free { .. } => self.retired.clone().unwrap_or_default(),
        }
    }

    /// Whether a free cell touches the pipette tip.
    pub fn touches(&self, pipette: &BoundingRange, cell: &BoundingRange) -> bool {
        touches(&self.config, pipette, cell)
    }

    /// Start aspirating when the tracked cell reached the pipette.
    pub fn check_transition(&mut self, pipette: &TrackState) {
        let Stage::Free { cell } = &mut self.stage else {
            return;
        };
        let (Some(pip), Some(cell_range)) = (pipette.range(), cell.range()) else {
            return;
        };
        if !touches(&self.config, &pip, &cell_range) {
            return;
        }

        info!(?pip, cell = ?cell_range, "cell reached pipette, aspirating");
        cell.kill();
        let mut body = Track::derived(self.stationary_threshold);
        body.commit(Some(pip));
        self.stage = Stage::Aspirating { body };
    }

    /// Follow the free cell; no-op while aspirating.
    pub fn update_cell(&mut self, frame: ArrayView2<'_, u8>) {
        if let Stage::Free { cell } = &mut self.stage {
            cell.update(frame);
        }
    }

    /// Advance the aspiration track for this frame.
    pub fn update_aspiration(
        &mut self,
        frame: ArrayView2<'_, u8>,
        pipette: &GeometricTrack,
        locator: &TipLocator,
    ) {
        if matches!(self.stage, Stage::Free { .. }) {
            return;
        }
        if !pipette.is_active() {
            info!("pipette lost during aspiration");
            self.abandon();
            return;
        }

        let step = match &mut self.stage {
            Stage::Free { .. } => Step::Stay,
            Stage::Aspirating { body } => {
                let seed = Seed {
                    factory: &self.factory,
                    correlation: &self.correlation,
                    stationary_threshold: self.stationary_threshold,
                };
                aspirating_step(body, frame, pipette, locator, &self.config, &seed)
            }
            Stage::FullyAspirated { body } => match body.update(frame) {
                None => {
                    info!("aspirated body lost");
                    Step::Abandon
                }
                Some(range) if range.center().0 < self.config.exit_border_px => {
                    info!(?range, "aspirated body left the frame");
                    body.kill();
                    Step::Abandon
                }
                Some(_) => Step::Stay,
            },
        };

        match step {
            Step::Stay => {}
            Step::Abandon => self.retire(),
            Step::Full(body) => self.stage = Stage::FullyAspirated { body },
        }
    }

    /// Track a newly selected cell. Any aspiration in progress is abandoned.
    pub fn initialize_cell(
        &mut self,
        frame: ArrayView2<'_, u8>,
        range: BoundingRange,
    ) -> Result<BoundingRange, TrackError> {
        if self.phase().is_aspirating() {
            info!("cell selected, abandoning aspiration");
            self.abandon();
        }
        let mut cell = CorrelationTrack::correlation(self.stationary_threshold);
        let result = cell.initialize(&self.factory, frame, range, &self.correlation);
        self.stage = Stage::Free { cell };
        result
    }

    /// Stop tracking the free cell without flagging a loss.
    pub fn kill_cell(&mut self) {
        if let Stage::Free { cell } = &mut self.stage {
            cell.kill();
        }
    }

    /// Drop the aspiration track and return to the free stage.
    pub fn kill_aspiration(&mut self) {
        if self.phase().is_aspirating() {
            debug!("aspiration track killed");
            self.abandon();
        }
    }

    pub fn clear_frame_flags(&mut self) {
        self.retired = None;
        match &mut self.stage {
            Stage::Free { cell } => cell.clear_frame_flags(),
            Stage::Aspirating { body } => body.clear_frame_flags(),
            Stage::FullyAspirated { body } => body.clear_frame_flags(),
        }
    }

    /// Back to a fresh free stage.
    pub fn reset(&mut self) {
        self.retired = None;
        self.stage = Stage::Free {
            cell: CorrelationTrack::correlation(self.stationary_threshold),
        };
    }

    /// Drop the aspiration track without reporting a loss.
    fn abandon(&mut self) {
        match &mut self.stage {
            Stage::Aspirating { body } => body.kill(),
            Stage::FullyAspirated { body } => body.kill(),
            Stage::Free { .. } => {}
        }
        self.retire();
    }

    /// Return to the free stage, keeping the dropped track's state for this frame.
    fn retire(&mut self) {
        let state = self.aspiration_state();
        self.reset();
        self.retired = Some(state);
    }
}

fn touches(config: &AspirationConfig, pipette: &BoundingRange, cell: &BoundingRange) -> bool {
    cell.x - config.overlap_margin_px <= pipette.x && pipette.overlaps_vertically(cell)
}

/// What a fully aspirated body needs to get its own correlation track.
struct Seed<'a, M> {
    factory: &'a M,
    correlation: &'a CorrelationConfig,
    stationary_threshold: u32,
}

/// Probe the lumen for the cell body's edges and decide whether the whole cell is inside.
fn aspirating_step<M: FilterFactory>(
    body: &mut Track<Derived>,
    frame: ArrayView2<'_, u8>,
    pipette: &GeometricTrack,
    locator: &TipLocator,
    config: &AspirationConfig,
    seed: &Seed<'_, M>,
) -> Step<M::Filter> {
    let (Some(pip), Some(geometry)) = (pipette.range(), pipette.geometry()) else {
        body.kill();
        return Step::Abandon;
    };
    let centerline = geometry.edges.centerline();
    let base = i64::from(config.probe_base_x);
    let tip_start = (pip.x + pip.width / 2.0) as i64 - i64::from(config.probe_tip_offset_px);

    let forward = locator.probe(frame, &centerline, base, tip_start, config.probe_threshold);
    let backward = locator.probe(frame, &centerline, tip_start, base, config.probe_threshold);
    let (Some(a), Some(b)) = (forward, backward) else {
        debug!(?forward, ?backward, "no cell edge inside the pipette");
        body.commit(Some(pip));
        return Step::Stay;
    };

    let (lo, hi) = (a.min(b) as f32, a.max(b) as f32);
    if hi - lo >= config.full_aspiration_distance_px {
        let region = BoundingRange::from_tlbr(
            lo - config.body_margin_px,
            pip.y,
            hi + config.body_margin_px,
            pip.y + pip.height,
        );
        let mut full = CorrelationTrack::correlation(seed.stationary_threshold);
        match full.initialize(seed.factory, frame, region, seed.correlation) {
            Ok(range) => {
                info!(?range, "cell fully aspirated");
                return Step::Full(full);
            }
            Err(err) => warn!(%err, "cannot track aspirated body, still aspirating"),
        }
    }

    body.commit(Some(BoundingRange::new((lo + hi) / 2.0, pip.y, 0.0, pip.height)));
    Step::Stay
}
