//! Image analysis used by the trackers.
//!
//! Segment detection and correlation filtering are consumed through traits
//! ([`SegmentDetector`], [`CorrelationFilter`]); the bundled Hough and MOSSE
//! implementations make the crate usable without an external vision library.

pub mod filter;
pub mod frame;
pub mod line_fit;
pub mod mosse;
pub mod overlay;
pub mod segments;
pub mod tip;

pub use filter::{CorrelationFilter, FilterFactory};
pub use frame::to_grayscale;
pub use line_fit::{EdgeLine, LineFitter, PipetteEdges};
pub use mosse::{MosseFactory, MosseFilter};
pub use segments::{HoughSegmentDetector, LineSegment, SegmentDetector};
pub use tip::{PipetteGeometry, PipetteTip, TipLocator};
