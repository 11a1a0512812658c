//! Error types for keel-types.

use crate::tree::TreeId;

/// Errors raised while building syntax trees or resolving their types.
#[derive(Debug, thiserror::Error)]
pub enum TypeResolveError {
    /// A tree or type kind that resolution does not model. Resolution stops
    /// rather than guess at a type.
    #[error("type resolution not supported for {what}")]
    Unsupported { what: String },

    /// A type expression could not be parsed.
    #[error("cannot parse type `{text}`: {reason}")]
    Parse { text: String, reason: String },

    /// A tree id does not belong to the arena it was used with.
    #[error("unknown tree {tree}")]
    UnknownTree { tree: TreeId },

    /// A tree outside the declaration a resolver was created for.
    #[error("tree {tree} is not part of declaration {declaration}")]
    ForeignTree { tree: TreeId, declaration: TreeId },

    /// The front end could not classify a tree or name the element it refers to.
    #[error("no {what} for tree {tree}")]
    Unclassified { what: &'static str, tree: TreeId },

    /// A type or package the resolution needs is not known.
    #[error("cannot find symbol `{name}`")]
    MissingElement { name: String },

    /// Two declarations share one qualified name.
    #[error("duplicate class `{name}`")]
    DuplicateClass { name: String },
}
