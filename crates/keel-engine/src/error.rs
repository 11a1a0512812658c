//! Error types for keel-engine.

use keel_target::TargetIdentity;

/// Errors produced by rule resolution and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A second registration for an already-registered target.
    #[error("a build rule for this target has already been created: {target}")]
    DuplicateRule { target: TargetIdentity },

    /// No rule is registered for the target.
    #[error("rule for target `{target}` could not be resolved")]
    UnresolvedTarget { target: TargetIdentity },

    /// The target graph has no node from which to build the target.
    #[error("rule for target `{target}` could not be resolved: no such node in the target graph")]
    NoTargetNode { target: TargetIdentity },

    /// The registered rule is of a different kind than the caller expected.
    #[error("rule for target `{target}` is not of expected type {expected} (found {actual})")]
    TypeMismatch {
        target: TargetIdentity,
        expected: &'static str,
        actual: &'static str,
    },

    /// The same target was declared twice while assembling a target graph.
    #[error("target `{target}` is declared more than once in the target graph")]
    DuplicateNode { target: TargetIdentity },

    /// A node depends on a target missing from the graph.
    #[error("target `{target}` depends on `{dependency}`, which is not in the target graph")]
    MissingDependency {
        target: TargetIdentity,
        dependency: TargetIdentity,
    },

    /// No transformer knows how to lower the node's kind.
    #[error("no rule transformer registered for kind `{kind}` (needed by `{target}`)")]
    NoTransformer { kind: String, target: TargetIdentity },

    /// A node's arguments do not have the shape its kind requires.
    #[error("target `{target}` has arguments of the wrong shape for kind `{kind}`")]
    InvalidArgs { target: TargetIdentity, kind: String },

    /// An ABI was requested from a rule that does not produce one.
    #[error("rule for target `{target}` does not have an ABI")]
    NoAbi { target: TargetIdentity },

    /// A rule transitively requires itself.
    #[error("dependency cycle detected: {cycle}")]
    DependencyCycle { cycle: String },

    /// A constructor produced a rule for a different target than requested.
    #[error("constructor for `{requested}` returned a rule for `{actual}`")]
    TargetMismatch {
        requested: TargetIdentity,
        actual: TargetIdentity,
    },

    /// A transformer failed for a reason outside this crate's taxonomy.
    #[error("cannot construct rule for `{target}`: {source}")]
    Construction {
        target: TargetIdentity,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A rule failed while producing its output.
    #[error("cannot build `{target}`: {source}")]
    Build {
        target: TargetIdentity,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] keel_util::error::UtilError),
}
