//! Error types shared by the gateway crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DurationError>;

/// Duration parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Input does not follow the `<number><unit>` grammar
    #[error("invalid duration {0:?}")]
    Invalid(String),

    /// A number was not followed by a unit
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    /// Unit is not one of ns, us, ms, s, m, h
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    /// Negative durations are rejected
    #[error("negative duration {0:?}")]
    Negative(String),

    /// Value does not fit in a u64 nanosecond count
    #[error("duration {0:?} overflows")]
    Overflow(String),
}
