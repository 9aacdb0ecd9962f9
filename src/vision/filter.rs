//! Short-term visual tracker interface.

use ndarray::ArrayView2;

use crate::tracker::BoundingRange;

/// A correlation-filter style tracker bound to one region.
///
/// # Example
///
/// ```ignore
/// use pipette_track::{BoundingRange, CorrelationFilter};
///
/// struct Template { /* learned appearance */ }
///
/// impl CorrelationFilter for Template {
///     fn init(&mut self, frame: ArrayView2<'_, u8>, region: BoundingRange) -> bool {
///         // learn the appearance inside `region`
///         true
///     }
///
///     fn update(&mut self, frame: ArrayView2<'_, u8>) -> Option<BoundingRange> {
///         // locate the best match, None when confidence is lost
///         None
///     }
/// }
/// ```
pub trait CorrelationFilter {
    /// Learn the appearance of `region`. Returns `false` when the region cannot be tracked.
    fn init(&mut self, frame: ArrayView2<'_, u8>, region: BoundingRange) -> bool;

    /// Locate the region in a new frame, `None` when the match is lost.
    fn update(&mut self, frame: ArrayView2<'_, u8>) -> Option<BoundingRange>;
}

/// Produces fresh, untrained filters. A filter is never reused across regions.
pub trait FilterFactory {
    type Filter: CorrelationFilter;

    fn create(&self) -> Self::Filter;
}

impl<F, C> FilterFactory for C
where
    F: CorrelationFilter,
    C: Fn() -> F,
{
    type Filter = F;

    fn create(&self) -> F {
        self()
    }
}
