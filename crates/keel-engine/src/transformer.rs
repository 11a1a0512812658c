//! Per-kind lowering of target nodes into build rules.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use keel_target::Flavor;

use crate::error::EngineError;
use crate::graph::TargetNode;
use crate::resolver::RuleResolver;
use crate::rule::RuleRef;

/// Lowers one target node into its build rule.
///
/// A transformer may call back into the resolver to require dependency
/// rules, and may register auxiliary rules with
/// [`RuleResolver::add_to_index`]. The returned rule must carry the node's
/// target identity.
pub trait RuleTransformer: Send + Sync {
    /// Build the rule for `node`.
    ///
    /// # Errors
    /// Returns an error if a dependency cannot be resolved or the node's
    /// arguments are invalid.
    fn transform(&self, node: &TargetNode, resolver: &RuleResolver)
        -> Result<RuleRef, EngineError>;

    /// Whether this transformer can build a flavored variant of one of its
    /// nodes. Flavored targets without a node of their own are only resolved
    /// through transformers that accept their flavors.
    fn supports_flavors(&self, _flavors: &BTreeSet<Flavor>) -> bool {
        false
    }
}

impl<F> RuleTransformer for F
where
    F: Fn(&TargetNode, &RuleResolver) -> Result<RuleRef, EngineError> + Send + Sync,
{
    fn transform(
        &self,
        node: &TargetNode,
        resolver: &RuleResolver,
    ) -> Result<RuleRef, EngineError> {
        self(node, resolver)
    }
}

/// Transformers keyed by target kind.
#[derive(Default, Clone)]
pub struct TransformerRegistry {
    by_kind: HashMap<String, Arc<dyn RuleTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transformer for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: &str, transformer: impl RuleTransformer + 'static) {
        self.by_kind.insert(kind.to_owned(), Arc::new(transformer));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: &str, transformer: impl RuleTransformer + 'static) -> Self {
        self.register(kind, transformer);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn RuleTransformer>> {
        self.by_kind.get(kind)
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.by_kind.keys().collect();
        kinds.sort();
        f.debug_struct("TransformerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}
