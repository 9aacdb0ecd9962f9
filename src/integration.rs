//! Glue between the tracking core and the rest of the instrument.
//!
//! This module runs the tracker on a worker thread, turns user selections into
//! ranges and holds the controller's "wait until settled" policies.

mod builder;
pub mod coordinator;
mod pipeline;

pub use builder::SelectionBuilder;
pub use coordinator::{StationaryWait, WaitStatus, wait_for};
pub use pipeline::{FramePayload, VisionCommand, VisionEvent, VisionWorker};
