use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no semantic version found in {0:?}")]
    NoVersionFound(String),

    #[error("invalid semantic version {input:?}: {reason}")]
    InvalidSemver { input: String, reason: String },

    #[error("invalid build number {0:?}: expected a non-negative integer")]
    InvalidBuildNumber(String),
}

impl ParseError {
    /// The part of the input that caused the failure
    pub fn offending(&self) -> &str {
        match self {
            ParseError::NoVersionFound(input) => input,
            ParseError::InvalidSemver { input, .. } => input,
            ParseError::InvalidBuildNumber(metadata) => metadata,
        }
    }
}
