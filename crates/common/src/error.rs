//! Common error types for Huddle components.

use thiserror::Error;

/// Errors raised while decoding shared types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// A media kind other than `audio` or `video`.
    #[error("Unknown media kind: {0}")]
    UnknownMediaKind(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
