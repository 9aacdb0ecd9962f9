use thiserror::Error;

/// Why the pipette could not be located in a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// The segment detector returned fewer than two segments.
    #[error("expected at least 2 line segments, found {found}")]
    TooFewSegments { found: usize },

    /// Every segment was vertical, so no orientation could be voted.
    #[error("no non-vertical segments to vote an orientation")]
    NoDominantOrientation,

    /// Fewer than two segments survived the orientation and midline filters.
    #[error("only {found} segment(s) agree with the dominant orientation")]
    InsufficientEdges { found: usize },

    /// A defining edge has coincident x coordinates.
    #[error("edge segment has an undefined gradient")]
    UndefinedGradient,

    /// The centerline never crosses the frame between the scan bounds.
    #[error("pipette centerline lies outside the frame")]
    CenterlineOutOfFrame,
}

/// Failures of correlation-track initialization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("requested region {width}x{height} has no area")]
    DegenerateRegion { width: f32, height: f32 },

    #[error("correlation filter failed to initialize after {attempts} attempts")]
    InitializationFailed { attempts: u32 },

    /// A cell was selected before any frame reached the tracker.
    #[error("no frame available to initialize against")]
    NoFrame,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors crossing the vision worker boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("vision worker is no longer running")]
    Disconnected,

    #[error("vision worker panicked")]
    WorkerPanicked,

    #[error("timed out waiting for vision events")]
    Timeout,
}
