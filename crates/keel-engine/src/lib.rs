//! Target graph, rule resolution, and rule keys for Keel.

pub mod action_graph;
pub mod error;
pub mod graph;
pub mod prebuilt;
pub mod resolver;
pub mod rule;
pub mod rule_key;
mod topo;
pub mod transformer;

pub use action_graph::{changed_targets, ActionGraph};
pub use error::EngineError;
pub use graph::{DependencyEdge, DependencyKind, TargetGraph, TargetNode};
pub use prebuilt::{PrebuiltArgs, PrebuiltRule, PrebuiltTransformer, PREBUILT_KIND};
pub use resolver::RuleResolver;
pub use rule::{downcast_rule, exported_rules, ArtifactRef, BuildRule, RuleRef, RuleSet};
pub use rule_key::RuleKey;
pub use transformer::{RuleTransformer, TransformerRegistry};
