use thiserror::Error;

/// Everything that can end a run (or prevent one from starting).
///
/// All failures inside a run funnel into a single terminal ERROR transition;
/// there is no partial-success state. `ModelLoadTimeout` and
/// `InferenceUnavailable` are surfaced at startup, before any run exists.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("image load failed: {0}")]
    ImageLoad(String),

    #[error("inference capability unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("segmentation timed out")]
    DetectionTimeout,

    #[error("segmentation failed: {0}")]
    DetectionFailed(String),

    #[error("no mask field in detection result")]
    MaskNotFound,

    #[error("capability initialization timed out")]
    ModelLoadTimeout,

    #[error("config error: {0}")]
    Config(String),
}
