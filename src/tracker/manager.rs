//! Per-frame orchestration of the pipette, cell and aspiration tracks.

use ndarray::{Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{ConfigError, TrackError};
use crate::tracker::aspiration::AspirationStateMachine;
use crate::tracker::geometric::{GeometricTrack, PipetteDetector};
use crate::tracker::rect::BoundingRange;
use crate::tracker::track_state::{AspirationPhase, TrackState};
use crate::vision::filter::FilterFactory;
use crate::vision::mosse::MosseFactory;
use crate::vision::overlay;
use crate::vision::segments::{HoughSegmentDetector, SegmentDetector};

/// Read-only view of every track after one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub frame_id: u64,
    pub pipette: TrackState,
    pub cell: TrackState,
    pub aspiration: TrackState,
    pub phase: AspirationPhase,
    /// RGB frame with the active tracks drawn in, when annotation is enabled
    #[serde(skip)]
    pub annotated: Option<Array3<u8>>,
}

impl Snapshot {
    /// Euclidean distance between the cell and pipette centers.
    pub fn cell_to_pipette_px(&self) -> Option<f32> {
        let pipette = self.pipette.range()?;
        let cell = self.cell.range()?;
        Some(cell.center_distance(&pipette))
    }

    /// Horizontal distance from the pipette center to the aspiration line.
    pub fn aspiration_to_pipette_px(&self) -> Option<f32> {
        let (pipette_x, _) = self.pipette.center()?;
        let aspiration = self.aspiration.range()?;
        Some((pipette_x - aspiration.x).abs())
    }
}

/// Owns the session: one pipette track and the aspiration state machine.
pub struct TrackerManager<D, M: FilterFactory> {
    config: TrackerConfig,
    detector: PipetteDetector<D>,
    pipette: GeometricTrack,
    aspiration: AspirationStateMachine<M>,
    last_frame: Option<Array2<u8>>,
    frame_id: u64,
}

impl TrackerManager<HoughSegmentDetector, MosseFactory> {
    /// Manager using the bundled Hough segment detector and MOSSE filters.
    pub fn from_config(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let segments = HoughSegmentDetector::new(config.segments.clone());
        let factory = MosseFactory::new(config.mosse.clone());
        Ok(Self::new(segments, factory, config))
    }
}

impl<D: SegmentDetector, M: FilterFactory> TrackerManager<D, M> {
    /// Manager over caller-supplied segment detection and correlation filters.
    /// `config` is taken as is; see [`TrackerConfig::validate`].
    pub fn new(segments: D, factory: M, config: TrackerConfig) -> Self {
        Self {
            detector: PipetteDetector::new(segments, &config.pipette),
            pipette: GeometricTrack::geometric(config.stationary_threshold),
            aspiration: AspirationStateMachine::new(factory, &config),
            last_frame: None,
            frame_id: 0,
            config,
        }
    }

    /// Run one frame through every track.
    ///
    /// Order matters: the aspiration transition is judged on the previous
    /// frame's positions, the cell and pipette are refreshed next, and the
    /// aspiration track last so it sees this frame's pipette.
    pub fn update(&mut self, frame: ArrayView2<'_, u8>, sensitivity: f32) -> Snapshot {
        self.frame_id += 1;

        self.aspiration.check_transition(self.pipette.state());
        self.aspiration.update_cell(frame);

        if !self.aspiration.phase().is_aspirating() {
            match self.detector.detect(frame, sensitivity) {
                Ok(geometry) => self
                    .pipette
                    .refresh(geometry, self.config.pipette.motion_deadband_px),
                Err(err) => debug!(frame_id = self.frame_id, %err, "pipette not detected"),
            }
        }

        self.aspiration
            .update_aspiration(frame, &self.pipette, self.detector.locator());

        self.last_frame = Some(frame.to_owned());
        self.snapshot()
    }

    /// State after the most recent update.
    pub fn snapshot(&self) -> Snapshot {
        let pipette = self.pipette.state().clone();
        let cell = self.aspiration.cell_state();
        let aspiration = self.aspiration.aspiration_state();
        let annotated = match &self.last_frame {
            Some(frame) if self.config.annotate => {
                Some(overlay::annotate(frame.view(), &pipette, &cell, &aspiration))
            }
            _ => None,
        };
        Snapshot {
            frame_id: self.frame_id,
            pipette,
            cell,
            aspiration,
            phase: self.aspiration.phase(),
            annotated,
        }
    }

    /// Start tracking a cell selected on the most recent frame.
    pub fn initialize_cell_track(&mut self, range: BoundingRange) -> Result<BoundingRange, TrackError> {
        let frame = self.last_frame.as_ref().ok_or(TrackError::NoFrame)?;
        let result = self.aspiration.initialize_cell(frame.view(), range);
        match &result {
            Ok(position) => info!(?position, "cell track started"),
            Err(err) => info!(%err, ?range, "cell selection rejected"),
        }
        result
    }

    /// Stop tracking the free cell. Not reported as a loss.
    pub fn kill_cell_track(&mut self) {
        self.aspiration.kill_cell();
    }

    /// End any aspiration in progress and return to the free stage.
    pub fn kill_aspiration_track(&mut self) {
        self.aspiration.kill_aspiration();
    }

    /// Forget the pipette until it is detected again. An aspiration in
    /// progress ends on the next update.
    pub fn kill_pipette_track(&mut self) {
        self.pipette.kill();
    }

    /// Reset every loss flag. Call once per frame after the snapshot was consumed.
    pub fn clear_frame_flags(&mut self) {
        self.pipette.clear_frame_flags();
        self.aspiration.clear_frame_flags();
    }

    /// Start a fresh session, forgetting every track and the last frame.
    pub fn reset(&mut self) {
        self.pipette = GeometricTrack::geometric(self.config.stationary_threshold);
        self.aspiration.reset();
        self.last_frame = None;
        self.frame_id = 0;
    }

    /// Current aspiration phase.
    pub fn phase(&self) -> AspirationPhase {
        self.aspiration.phase()
    }

    /// The pipette track, including its last fitted geometry.
    pub fn pipette(&self) -> &GeometricTrack {
        &self.pipette
    }

    /// Number of frames since construction or the last reset.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::segments::LineSegment;

    fn walls(_frame: ArrayView2<'_, u8>) -> Vec<LineSegment> {
        vec![
            LineSegment::new(0, 100, 150, 100),
            LineSegment::new(0, 140, 150, 140),
        ]
    }

    fn no_walls(_frame: ArrayView2<'_, u8>) -> Vec<LineSegment> {
        Vec::new()
    }

    fn pipette_frame() -> Array2<u8> {
        Array2::from_shape_fn((200, 240), |(y, x)| {
            if (100..=140).contains(&y) && x < 153 { 50 } else { 200 }
        })
    }

    fn manager<D: SegmentDetector>(segments: D, annotate: bool) -> TrackerManager<D, MosseFactory> {
        let config = TrackerConfig {
            annotate,
            ..TrackerConfig::default()
        };
        TrackerManager::new(segments, MosseFactory::default(), config)
    }

    #[test]
    fn test_pipette_detected_and_stationary() {
        let mut manager = manager(walls, false);
        let frame = pipette_frame();
        let first = manager.update(frame.view(), 20.0);
        assert_eq!(first.frame_id, 1);
        assert_eq!(
            first.pipette.range(),
            Some(BoundingRange::new(150.0, 100.0, 0.0, 40.0))
        );
        assert!(first.annotated.is_none());

        let second = manager.update(frame.view(), 20.0);
        assert_eq!(second.pipette.stationary_frames, 1);
        assert_eq!(second.phase, AspirationPhase::NotAspirating);
    }

    #[test]
    fn test_detection_failure_leaves_pipette_unchanged() {
        let mut manager = manager(no_walls, false);
        let snapshot = manager.update(pipette_frame().view(), 20.0);
        assert!(!snapshot.pipette.is_active());
        assert!(!snapshot.pipette.was_lost());
    }

    #[test]
    fn test_active_pipette_survives_missing_walls() {
        let mut calls = 0;
        let flaky = move |frame: ArrayView2<'_, u8>| {
            calls += 1;
            let mut segments = walls(frame);
            if calls > 1 {
                segments.truncate(1);
            }
            segments
        };
        let mut manager = manager(flaky, false);
        let before = manager.update(pipette_frame().view(), 20.0);
        assert_eq!(
            before.pipette.range(),
            Some(BoundingRange::new(150.0, 100.0, 0.0, 40.0))
        );
        manager.clear_frame_flags();

        let after = manager.update(pipette_frame().view(), 20.0);
        assert_eq!(after.pipette.range(), before.pipette.range());
        assert!(after.pipette.is_active());
        assert!(!after.pipette.was_lost());
        assert!(manager.pipette().geometry().is_some());
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let mut config = TrackerConfig::default();
        config.segments.theta_step_deg = 0.0;
        assert!(matches!(
            TrackerManager::from_config(config),
            Err(ConfigError::Invalid(_))
        ));
        assert!(TrackerManager::from_config(TrackerConfig::default()).is_ok());
    }

    #[test]
    fn test_selection_needs_a_frame() {
        let mut manager = manager(walls, false);
        assert_eq!(
            manager.initialize_cell_track(BoundingRange::new(10.0, 10.0, 20.0, 20.0)),
            Err(TrackError::NoFrame)
        );
    }

    #[test]
    fn test_annotation() {
        let mut manager = manager(walls, true);
        let snapshot = manager.update(pipette_frame().view(), 20.0);
        let image = snapshot.annotated.unwrap();
        assert_eq!(image.dim(), (200, 240, 3));
        assert_eq!(image[[120, 150, 0]], overlay::PIPETTE_COLOR.0);
    }

    #[test]
    fn test_reset_forgets_session() {
        let mut manager = manager(walls, false);
        manager.update(pipette_frame().view(), 20.0);
        manager.reset();
        assert_eq!(manager.frame_id(), 0);
        assert!(!manager.snapshot().pipette.is_active());
        assert_eq!(
            manager.initialize_cell_track(BoundingRange::new(10.0, 10.0, 20.0, 20.0)),
            Err(TrackError::NoFrame)
        );
    }

    #[test]
    fn test_snapshot_distances() {
        let mut pipette = TrackState::default();
        pipette.commit(Some(BoundingRange::new(100.0, 100.0, 0.0, 40.0)), 50);
        let mut cell = TrackState::default();
        cell.commit(Some(BoundingRange::new(130.0, 110.0, 20.0, 20.0)), 50);
        let mut aspiration = TrackState::default();
        aspiration.commit(Some(BoundingRange::new(70.0, 100.0, 0.0, 40.0)), 50);

        let snapshot = Snapshot {
            frame_id: 3,
            pipette,
            cell,
            aspiration,
            phase: AspirationPhase::NotAspirating,
            annotated: None,
        };
        // centers (100, 120) and (140, 120)
        assert_eq!(snapshot.cell_to_pipette_px(), Some(40.0));
        assert_eq!(snapshot.aspiration_to_pipette_px(), Some(30.0));

        let empty = Snapshot {
            cell: TrackState::default(),
            ..snapshot
        };
        assert_eq!(empty.cell_to_pipette_px(), None);
    }
}
