//! Error types for keel-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// A value could not be serialized for hashing.
    #[error("cannot serialize value for hashing: {message}")]
    Serialize { message: String },
}
