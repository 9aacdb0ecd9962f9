mod aspiration;
mod correlation;
mod geometric;
mod manager;
mod rect;
mod track;
mod track_state;

pub use aspiration::{AspirationStateMachine, Stage};
pub use correlation::{Correlation, CorrelationTrack};
pub use geometric::{Geometric, GeometricTrack, PipetteDetector};
pub use manager::{Snapshot, TrackerManager};
pub use rect::BoundingRange;
pub use track::{Derived, Strategy, Track};
pub use track_state::{AspirationPhase, STATIONARY_THRESHOLD, TrackState};
