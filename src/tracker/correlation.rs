//! Tracks driven by a correlation filter: the free cell and the aspirated body.

use ndarray::ArrayView2;
use tracing::{debug, warn};

use crate::config::CorrelationConfig;
use crate::error::TrackError;
use crate::tracker::rect::BoundingRange;
use crate::tracker::track::{Strategy, Track};
use crate::vision::filter::{CorrelationFilter, FilterFactory};

/// Owns the trained filter while the track is active.
#[derive(Debug, Clone)]
pub struct Correlation<F> {
    filter: Option<F>,
}

impl<F> Default for Correlation<F> {
    fn default() -> Self {
        Self { filter: None }
    }
}

impl<F> Strategy for Correlation<F> {
    fn discard(&mut self) {
        self.filter = None;
    }
}

pub type CorrelationTrack<F> = Track<Correlation<F>>;

impl<F: CorrelationFilter> Track<Correlation<F>> {
    pub fn correlation(stationary_threshold: u32) -> Self {
        Self::new(Correlation::default(), stationary_threshold)
    }

    pub fn has_model(&self) -> bool {
        self.strategy().filter.is_some()
    }

    /// Start tracking `range` with a freshly created filter.
    ///
    /// Each failed attempt grows the box around its center before retrying. A
    /// successful initialization is followed by one update whose result becomes
    /// the track position.
    pub fn initialize<M>(
        &mut self,
        factory: &M,
        frame: ArrayView2<'_, u8>,
        range: BoundingRange,
        config: &CorrelationConfig,
    ) -> Result<BoundingRange, TrackError>
    where
        M: FilterFactory<Filter = F>,
    {
        self.kill();
        if range.is_degenerate() {
            return Err(TrackError::DegenerateRegion {
                width: range.width,
                height: range.height,
            });
        }

        let attempts = config.max_init_attempts;
        let mut region = range;
        for attempt in 1..=attempts {
            let mut filter = factory.create();
            if filter.init(frame, region) {
                self.strategy_mut().filter = Some(filter);
                if let Some(position) = self.update(frame) {
                    debug!(attempt, ?position, "correlation track initialized");
                    return Ok(position);
                }
            }
            debug!(attempt, ?region, "correlation filter rejected region");
            region = region.grown(config.growth_per_attempt);
        }

        warn!(attempts, ?range, "correlation track failed to initialize");
        Err(TrackError::InitializationFailed { attempts })
    }

    /// Follow the target into `frame`. The track is cleared when the filter loses it.
    ///
    /// A track without a model stays inactive and returns `None`.
    pub fn update(&mut self, frame: ArrayView2<'_, u8>) -> Option<BoundingRange> {
        let filter = self.strategy_mut().filter.as_mut()?;
        let position = filter.update(frame);
        if position.is_none() {
            debug!("correlation track lost");
        }
        self.commit(position);
        position
    }
}
