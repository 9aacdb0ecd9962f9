//! Tunable constants for detection, tracking and aspiration.
//!
//! Every section has defaults taken from the bench rig, so an empty TOML
//! document yields a working configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracker::STATIONARY_THRESHOLD;

/// Configuration for the tracking core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Unchanged frames before a track is considered stationary
    pub stationary_threshold: u32,
    /// Draw track rectangles into each snapshot
    pub annotate: bool,
    pub segments: SegmentConfig,
    pub pipette: PipetteConfig,
    pub correlation: CorrelationConfig,
    pub mosse: MosseConfig,
    pub aspiration: AspirationConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stationary_threshold: STATIONARY_THRESHOLD,
            annotate: false,
            segments: SegmentConfig::default(),
            pipette: PipetteConfig::default(),
            correlation: CorrelationConfig::default(),
            mosse: MosseConfig::default(),
            aspiration: AspirationConfig::default(),
        }
    }
}

/// Edge map and Hough transform parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Hysteresis low threshold on L1 gradient magnitude
    pub canny_low: f32,
    /// Hysteresis high threshold on L1 gradient magnitude
    pub canny_high: f32,
    /// Minimum accumulator votes for a line
    pub vote_threshold: u32,
    pub min_line_length: f32,
    pub max_line_gap: u32,
    /// Angular resolution of the accumulator in degrees
    pub theta_step_deg: f32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            canny_low: 20.0,
            canny_high: 60.0,
            vote_threshold: 50,
            min_line_length: 50.0,
            max_line_gap: 5,
            theta_step_deg: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipetteConfig {
    /// First column examined when walking toward the tip
    pub scan_start_x: usize,
    /// Pixel distance between the two intensities compared
    pub comparison_distance: usize,
    /// Maximum gradient deviation from the dominant orientation
    pub gradient_tolerance: f32,
    /// Maximum midpoint distance from the median segment midpoint
    pub midline_tolerance_px: f32,
    /// Center displacement below which a new detection is ignored
    pub motion_deadband_px: f32,
}

impl Default for PipetteConfig {
    fn default() -> Self {
        Self {
            scan_start_x: 20,
            comparison_distance: 5,
            gradient_tolerance: 0.1,
            midline_tolerance_px: 100.0,
            motion_deadband_px: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub max_init_attempts: u32,
    /// Fractional growth of the requested box after each failed attempt
    pub growth_per_attempt: f32,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_init_attempts: 5,
            growth_per_attempt: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosseConfig {
    /// Running-average weight of each new frame in the filter model
    pub learning_rate: f32,
    /// Minimum peak-to-sidelobe ratio for a successful update
    pub psr_threshold: f32,
    /// Standard deviation of the Gaussian target response
    pub sigma: f32,
    /// Regularizer added to the filter denominator
    pub epsilon: f32,
    /// Smallest patch side accepted at initialization
    pub min_patch_size: usize,
}

impl Default for MosseConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.125,
            psr_threshold: 5.7,
            sigma: 2.0,
            epsilon: 1e-5,
            min_patch_size: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AspirationConfig {
    /// How far right of the pipette tip a cell's left edge may sit and still count as touching
    pub overlap_margin_px: f32,
    /// Contrast required by the lumen edge probes
    pub probe_threshold: f32,
    /// Column where the forward probe starts
    pub probe_base_x: i32,
    /// Distance behind the tip where the backward probe starts
    pub probe_tip_offset_px: i32,
    /// Probe separation at which the cell is considered fully aspirated
    pub full_aspiration_distance_px: f32,
    /// Padding added on both sides of the aspirated body region
    pub body_margin_px: f32,
    /// Aspiration ends once the body's center is this close to the left border
    pub exit_border_px: f32,
}

impl Default for AspirationConfig {
    fn default() -> Self {
        Self {
            overlap_margin_px: 5.0,
            probe_threshold: 10.0,
            probe_base_x: 5,
            probe_tip_offset_px: 10,
            full_aspiration_distance_px: 20.0,
            body_margin_px: 10.0,
            exit_border_px: 10.0,
        }
    }
}

/// Constants the controller side needs to interpret snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub pixels_per_micron: f32,
    /// Cell-to-pipette distance (microns) within which latching may begin
    pub latch_distance_um: f32,
    /// Snapshots to wait for a settle condition before giving up
    pub settle_budget_frames: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            pixels_per_micron: 72.0,
            latch_distance_um: 2.0,
            settle_budget_frames: 300,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipette.comparison_distance == 0 {
            return Err(ConfigError::Invalid(
                "pipette.comparison_distance must be at least 1".into(),
            ));
        }
        if self.correlation.max_init_attempts == 0 {
            return Err(ConfigError::Invalid(
                "correlation.max_init_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mosse.learning_rate) {
            return Err(ConfigError::Invalid(format!(
                "mosse.learning_rate {} outside [0, 1]",
                self.mosse.learning_rate
            )));
        }
        if self.mosse.sigma <= 0.0 {
            return Err(ConfigError::Invalid("mosse.sigma must be positive".into()));
        }
        let step = self.segments.theta_step_deg;
        if step.is_nan() || step <= 0.0 || step > 90.0 {
            return Err(ConfigError::Invalid(format!(
                "segments.theta_step_deg {step} outside (0, 90]"
            )));
        }
        if self.segments.canny_low > self.segments.canny_high {
            return Err(ConfigError::Invalid(
                "segments.canny_low exceeds segments.canny_high".into(),
            ));
        }
        Ok(())
    }
}

impl ControlConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        if config.pixels_per_micron <= 0.0 {
            return Err(ConfigError::Invalid(
                "pixels_per_micron must be positive".into(),
            ));
        }
        Ok(config)
    }
}
