//! Error types for tick configuration and clock control.

use thiserror::Error;

/// Result type for tick operations.
pub type TickResult<T> = Result<T, TickError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    /// A configuration value is out of range.
    #[error("invalid tick config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// `restore_after_prediction` was called without a matching rewind.
    #[error("client clock restored without a prior rewind")]
    NotRewound,

    /// The clock was rewound twice without restoring.
    #[error("client clock already rewound to {rewound_to}")]
    AlreadyRewound { rewound_to: u32 },
}
