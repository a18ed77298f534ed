//! Crate-wide error types.
//!
//! Errors fall into a small fixed taxonomy:
//!
//! - `Configuration`: invalid setup (bad norm name, malformed time-shift
//!   group, unknown grid convention, ...) detected before any computation
//! - `IndexOutOfRange`: a grid index past `grid.size()`
//! - `InsufficientPadding`: Green's-function padding does not cover the
//!   requested time-shift bounds
//! - `SamplingConsistency`: heterogeneous sampling that the accelerated
//!   misfit tier cannot reconcile
//! - `Cancelled`: a grid search aborted via its cancellation token
//!
//! Configuration, padding, and sampling errors abort a whole search; local
//! conditions (missing channels, empty categories) are recovered with
//! warning-level diagnostics instead and never surface here.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("grid index {index} out of range for grid of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("insufficient Green's function padding at station {station}: {message}")]
    InsufficientPadding { station: String, message: String },

    #[error("inconsistent sampling at station {station}: {message}")]
    SamplingConsistency { station: String, message: String },

    #[error("grid search cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a `Configuration` error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}
