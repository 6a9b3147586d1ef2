//! # Garm Core
//!
//! Shared helpers for the gateway crates: configuration-string environment
//! indirection and Go-style duration parsing.

pub mod duration;
pub mod env;
pub mod error;

pub use duration::{parse_duration, parse_duration_or};
pub use env::{actual_value, actual_value_with, placeholder_name};
pub use error::{DurationError, Result};

/// Configuration format version understood by this release
pub const CONFIG_VERSION: &str = "v2.0.0";
