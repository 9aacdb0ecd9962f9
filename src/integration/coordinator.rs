//! Controller-side decisions made from snapshots.
//!
//! The motion controller never looks at tracks directly. It waits for the
//! worker to report a settled scene and checks distances in microns.

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::config::ControlConfig;
use crate::error::PipelineError;
use crate::integration::pipeline::VisionEvent;
use crate::tracker::{Snapshot, TrackState};

/// Neither the free cell nor the aspirated body is moving.
pub fn cell_settled(snapshot: &Snapshot) -> bool {
    let moving = |state: &TrackState| state.is_active() && state.is_moving();
    !moving(&snapshot.cell) && !moving(&snapshot.aspiration)
}

pub fn pipette_settled(snapshot: &Snapshot) -> bool {
    snapshot.pipette.is_active() && !snapshot.pipette.is_moving()
}

/// Something is still there to approach.
pub fn approach_pending(snapshot: &Snapshot) -> bool {
    snapshot.cell.is_active() || snapshot.aspiration.is_active()
}

#[inline]
pub fn px_to_um(px: f32, config: &ControlConfig) -> f32 {
    px / config.pixels_per_micron
}

pub fn cell_distance_um(snapshot: &Snapshot, config: &ControlConfig) -> Option<f32> {
    snapshot.cell_to_pipette_px().map(|px| px_to_um(px, config))
}

pub fn aspiration_distance_um(snapshot: &Snapshot, config: &ControlConfig) -> Option<f32> {
    snapshot
        .aspiration_to_pipette_px()
        .map(|px| px_to_um(px, config))
}

/// Whether latching (pressure-driven aspiration) may continue.
///
/// Requires the pipette and either a free cell within the latch distance or
/// an aspiration already under way.
pub fn latch_ready(snapshot: &Snapshot, config: &ControlConfig) -> bool {
    if !snapshot.pipette.is_active() {
        return false;
    }
    match cell_distance_um(snapshot, config) {
        Some(distance) => distance <= config.latch_distance_um,
        None => snapshot.aspiration.is_active(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Pending,
    Satisfied,
    Expired,
}

/// Counts snapshots until a condition holds or the frame budget runs out.
#[derive(Debug, Clone)]
pub struct StationaryWait<C> {
    condition: C,
    budget: u32,
    seen: u32,
}

impl<C: Fn(&Snapshot) -> bool> StationaryWait<C> {
    pub fn new(condition: C, budget: u32) -> Self {
        Self {
            condition,
            budget,
            seen: 0,
        }
    }

    pub fn observe(&mut self, snapshot: &Snapshot) -> WaitStatus {
        self.seen += 1;
        if (self.condition)(snapshot) {
            WaitStatus::Satisfied
        } else if self.seen >= self.budget {
            WaitStatus::Expired
        } else {
            WaitStatus::Pending
        }
    }

    pub fn frames_seen(&self) -> u32 {
        self.seen
    }
}

/// Block on the worker's events until `condition` holds for a snapshot.
///
/// Other events are skipped. Fails with `Timeout` after `budget` snapshots and
/// with `Disconnected` when the worker stops.
pub fn wait_for<C>(
    events: &Receiver<VisionEvent>,
    condition: C,
    budget: u32,
) -> Result<Snapshot, PipelineError>
where
    C: Fn(&Snapshot) -> bool,
{
    let mut wait = StationaryWait::new(condition, budget);
    loop {
        let VisionEvent::Snapshot(snapshot) = events.recv().map_err(|_| PipelineError::Disconnected)? else {
            continue;
        };
        match wait.observe(&snapshot) {
            WaitStatus::Satisfied => {
                debug!(frames = wait.frames_seen(), "wait condition met");
                return Ok(snapshot);
            }
            WaitStatus::Expired => return Err(PipelineError::Timeout),
            WaitStatus::Pending => {}
        }
    }
}
