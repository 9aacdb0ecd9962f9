//! Pipette, cell and aspiration tracking for micropipette aspiration rigs.
//!
//! [`TrackerManager`] consumes grayscale frames and keeps three tracks: the
//! pipette tip (found geometrically in every frame), a user-selected cell
//! (followed by a correlation filter), and the aspirated part of the cell once
//! it enters the pipette. [`VisionWorker`] runs a manager on its own thread.

pub mod config;
pub mod error;
pub mod integration;
pub mod tracker;
pub mod vision;

pub use config::{ControlConfig, TrackerConfig};
pub use error::{ConfigError, DetectionError, PipelineError, TrackError};
pub use integration::{FramePayload, SelectionBuilder, VisionCommand, VisionEvent, VisionWorker};
pub use tracker::{AspirationPhase, BoundingRange, Snapshot, TrackState, TrackerManager};
pub use vision::{CorrelationFilter, FilterFactory, HoughSegmentDetector, LineSegment, MosseFilter, SegmentDetector};
