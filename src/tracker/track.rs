//! A single tracked object: its [`TrackState`] plus whatever refreshes it.

use crate::tracker::rect::BoundingRange;
use crate::tracker::track_state::TrackState;

/// How a track's position is produced from frame to frame.
pub trait Strategy {
    /// Drop any model tied to the current position. Called whenever the track is cleared.
    fn discard(&mut self);
}

/// Position set from outside, e.g. the aspiration line computed from the pipette walls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Derived;

impl Strategy for Derived {
    fn discard(&mut self) {}
}

/// Single object track.
#[derive(Debug, Clone)]
pub struct Track<S> {
    state: TrackState,
    stationary_threshold: u32,
    strategy: S,
}

impl<S: Strategy> Track<S> {
    pub fn new(strategy: S, stationary_threshold: u32) -> Self {
        Self {
            state: TrackState::default(),
            stationary_threshold,
            strategy,
        }
    }

    #[inline]
    pub fn state(&self) -> &TrackState {
        &self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    #[inline]
    pub fn range(&self) -> Option<BoundingRange> {
        self.state.range()
    }

    pub(crate) fn strategy(&self) -> &S {
        &self.strategy
    }

    pub(crate) fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Record this frame's position. `None` clears the track and discards its model.
    pub fn commit(&mut self, position: Option<BoundingRange>) {
        if position.is_none() {
            self.strategy.discard();
        }
        self.state.commit(position, self.stationary_threshold);
    }

    /// Deactivate on request. Unlike a failed update this is not reported as a loss.
    pub fn kill(&mut self) {
        self.strategy.discard();
        self.state.clear();
    }

    pub fn clear_frame_flags(&mut self) {
        self.state.clear_frame_flags();
    }
}

impl Track<Derived> {
    pub fn derived(stationary_threshold: u32) -> Self {
        Self::new(Derived, stationary_threshold)
    }
}
