//! Error types for recognizer construction and request validation

use thiserror::Error;

/// Errors raised while building recognizers from configuration, or when a
/// request is rejected at the service boundary.
///
/// Engine configuration errors are never fatal to the pipeline: the registry
/// logs and skips the offending descriptor.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeidError {
    #[error("Failed to compile pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Pattern '{name}' has score {score} outside [0, 1]")]
    InvalidScore { name: String, score: f64 },

    #[error("Invalid recognizer descriptor {id}: {reason}")]
    InvalidDescriptor { id: i64, reason: String },

    #[error("Unknown recognizer kind '{0}'")]
    UnknownRecognizerKind(String),

    #[error("Text must not be empty")]
    EmptyInput,
}

pub type DeidResult<T> = std::result::Result<T, DeidError>;
