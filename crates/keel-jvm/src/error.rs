//! Error types for keel-jvm.

use keel_engine::EngineError;
use keel_target::TargetIdentity;
use keel_types::TypeResolveError;

/// Errors produced while planning, compiling, or verifying JVM libraries.
#[derive(Debug, thiserror::Error)]
pub enum JvmError {
    /// The class ABI and the source ABI of a library disagree.
    #[error("ABI mismatch in `{target}`: class ABI and source ABI differ at {member}")]
    AbiMismatch {
        target: TargetIdentity,
        member: String,
    },

    /// A rule for an ABI jar was requested for something that cannot have one.
    #[error("`{target}` is not an ABI target: {reason}")]
    NotAnAbiTarget {
        target: TargetIdentity,
        reason: &'static str,
    },

    /// The class compiler rejected the sources.
    #[error("compilation of `{target}` failed: {message}")]
    Compilation {
        target: TargetIdentity,
        message: String,
    },

    /// Type resolution failed while deriving an ABI from source.
    #[error("cannot resolve types in `{target}`: {source}")]
    TypeResolve {
        target: TargetIdentity,
        source: TypeResolveError,
    },

    /// A resolver operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] keel_util::error::UtilError),
}

impl JvmError {
    /// Surface this error through the engine while constructing `target`.
    /// Engine errors pass through unchanged.
    pub fn into_construction(self, target: &TargetIdentity) -> EngineError {
        match self {
            Self::Engine(err) => err,
            other => EngineError::Construction {
                target: target.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Surface this error through the engine while building `target`.
    pub fn into_build(self, target: &TargetIdentity) -> EngineError {
        match self {
            Self::Engine(err) => err,
            other => EngineError::Build {
                target: target.clone(),
                source: Box::new(other),
            },
        }
    }
}
