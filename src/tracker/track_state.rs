use serde::{Deserialize, Serialize};

use crate::tracker::rect::BoundingRange;

/// Number of consecutive unchanged frames after which a track counts as stationary.
pub const STATIONARY_THRESHOLD: u32 = 50;

/// Aspiration lifecycle of the cell under the pipette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspirationPhase {
    /// A free cell may be tracked; nothing is inside the pipette
    #[default]
    NotAspirating,
    /// The cell is partially drawn into the lumen
    Aspirating,
    /// The whole cell body is inside the lumen
    FullyAspirated,
}

impl AspirationPhase {
    pub fn is_aspirating(self) -> bool {
        !matches!(self, Self::NotAspirating)
    }
}

/// Plain, serializable record of one track's position and liveness.
///
/// This is what consumers see; the tracker objects that produce it (and any
/// correlation model they own) never leave the tracking core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// Current range, `None` while the track is inactive
    pub position: Option<BoundingRange>,
    /// Consecutive frames without corner movement
    pub stationary_frames: u32,
    /// `stationary_frames < threshold`
    pub is_moving: bool,
    /// Set on the frame the track went from active to unset
    pub lost_this_frame: bool,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            position: None,
            stationary_frames: 0,
            is_moving: true,
            lost_this_frame: false,
        }
    }
}

impl TrackState {
    /// Whether the track currently has a position.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.position.is_some()
    }

    /// False once the position held still for `stationary_threshold` frames.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Set only on the frame the track was lost.
    #[inline]
    pub fn was_lost(&self) -> bool {
        self.lost_this_frame
    }

    /// Current position, if any.
    #[inline]
    pub fn range(&self) -> Option<BoundingRange> {
        self.position
    }

    /// Center of the current range.
    pub fn center(&self) -> Option<(f32, f32)> {
        self.position.map(|p| p.center())
    }

    /// Record this frame's outcome for the track.
    ///
    /// `None` clears the track; if it was active this marks it lost for the frame.
    /// A position committed while active either extends the stationary run (zero
    /// corner displacement) or restarts it.
    pub fn commit(&mut self, position: Option<BoundingRange>, threshold: u32) {
        match (self.position, position) {
            (Some(_), None) => {
                self.lost_this_frame = true;
                self.clear();
            }
            (None, None) => self.clear(),
            (Some(previous), Some(next)) => {
                if previous.corner_displacement(&next) == 0.0 {
                    self.stationary_frames = self.stationary_frames.saturating_add(1);
                } else {
                    self.stationary_frames = 0;
                }
                self.position = Some(next);
            }
            (None, Some(next)) => {
                self.stationary_frames = 0;
                self.position = Some(next);
            }
        }
        self.is_moving = self.stationary_frames < threshold;
    }

    /// Deactivate without flagging a loss.
    pub fn clear(&mut self) {
        self.position = None;
        self.stationary_frames = 0;
        self.is_moving = true;
    }

    pub fn clear_frame_flags(&mut self) {
        self.lost_this_frame = false;
    }
}
