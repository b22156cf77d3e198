//! Analysis errors

use kneeguard_core::KneeGuardError;
use thiserror::Error;

pub type SmoothnessResult<T> = Result<T, SmoothnessError>;

/// Why a window could not be scored
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SmoothnessError {
    #[error("need at least {needed} samples, got {got}")]
    TooFewSamples { needed: usize, got: usize },

    #[error("{orientations} orientations but {times} timestamps")]
    LengthMismatch { orientations: usize, times: usize },

    #[error("time does not advance at sample {index}")]
    NonMonotonicTime { index: usize },

    #[error("sampling rate {0} Hz is not usable")]
    InvalidSampleRate(f64),

    /// Zero or non-finite speed profile; nothing to normalize against
    #[error("movement profile is flat")]
    FlatSignal,
}

impl From<SmoothnessError> for KneeGuardError {
    fn from(_: SmoothnessError) -> Self {
        KneeGuardError::InvalidInput { reason: "window cannot be scored for smoothness" }
    }
}
