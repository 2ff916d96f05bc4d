//! Error types for the prediction controller.

use thiserror::Error;

/// Result type for prediction operations.
pub type PredictionResult<T> = Result<T, PredictionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PredictionError {
    /// A configuration value is out of range.
    #[error("invalid prediction config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The requested target is not a valid network tick.
    #[error("invalid prediction target tick 0x{raw:08X}")]
    InvalidTarget { raw: u32 },

    /// Client clock misuse during replay.
    #[error("clock error: {0}")]
    Clock(#[from] tick::TickError),
}
