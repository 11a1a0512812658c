//! The declarative target graph consumed by the resolver.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use keel_target::TargetIdentity;

use crate::error::EngineError;
use crate::topo::topological_order;

/// How a target depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    /// Part of the target's logical API dependencies.
    Declared,
    /// Re-exported: consumers of the target see it as their own dependency.
    Exported,
    /// Needed at compile time only.
    Provided,
    /// Needed to run the build (tooling, generators) but not part of the API.
    Extra,
}

/// A `(source, dependency, kind)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEdge {
    pub source: TargetIdentity,
    pub dependency: TargetIdentity,
    pub kind: DependencyKind,
}

/// Declarative description of one target.
///
/// `args` holds the kind-specific arguments; transformers downcast them with
/// [`TargetNode::args`].
#[derive(Clone)]
pub struct TargetNode {
    target: TargetIdentity,
    kind: String,
    declared_deps: BTreeSet<TargetIdentity>,
    exported_deps: BTreeSet<TargetIdentity>,
    provided_deps: BTreeSet<TargetIdentity>,
    extra_deps: BTreeSet<TargetIdentity>,
    args: Arc<dyn Any + Send + Sync>,
}

impl TargetNode {
    pub fn new<A: Any + Send + Sync>(target: TargetIdentity, kind: &str, args: A) -> Self {
        Self {
            target,
            kind: kind.to_owned(),
            declared_deps: BTreeSet::new(),
            exported_deps: BTreeSet::new(),
            provided_deps: BTreeSet::new(),
            extra_deps: BTreeSet::new(),
            args: Arc::new(args),
        }
    }

    /// Add a dependency of the given kind.
    pub fn with_dep(mut self, kind: DependencyKind, dependency: TargetIdentity) -> Self {
        self.deps_mut(kind).insert(dependency);
        self
    }

    pub fn target(&self) -> &TargetIdentity {
        &self.target
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Dependencies of one kind, in target order.
    pub fn deps(&self, kind: DependencyKind) -> &BTreeSet<TargetIdentity> {
        match kind {
            DependencyKind::Declared => &self.declared_deps,
            DependencyKind::Exported => &self.exported_deps,
            DependencyKind::Provided => &self.provided_deps,
            DependencyKind::Extra => &self.extra_deps,
        }
    }

    fn deps_mut(&mut self, kind: DependencyKind) -> &mut BTreeSet<TargetIdentity> {
        match kind {
            DependencyKind::Declared => &mut self.declared_deps,
            DependencyKind::Exported => &mut self.exported_deps,
            DependencyKind::Provided => &mut self.provided_deps,
            DependencyKind::Extra => &mut self.extra_deps,
        }
    }

    /// Every dependency edge leaving this node.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let kinds = [
            DependencyKind::Declared,
            DependencyKind::Exported,
            DependencyKind::Provided,
            DependencyKind::Extra,
        ];
        kinds
            .into_iter()
            .flat_map(|kind| {
                self.deps(kind).iter().map(move |dependency| DependencyEdge {
                    source: self.target.clone(),
                    dependency: dependency.clone(),
                    kind,
                })
            })
            .collect()
    }

    /// Downcast the kind-specific arguments.
    pub fn args<A: Any>(&self) -> Option<&A> {
        self.args.downcast_ref::<A>()
    }

    /// Downcast the kind-specific arguments, failing with the node's identity.
    ///
    /// # Errors
    /// Returns an error if the arguments are not of type `A`.
    pub fn require_args<A: Any>(&self) -> Result<&A, EngineError> {
        self.args::<A>().ok_or_else(|| EngineError::InvalidArgs {
            target: self.target.clone(),
            kind: self.kind.clone(),
        })
    }

    /// The same node under a different (flavored) identity.
    pub(crate) fn retarget(&self, target: TargetIdentity) -> Self {
        Self {
            target,
            ..self.clone()
        }
    }
}

impl fmt::Debug for TargetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetNode")
            .field("target", &self.target.to_string())
            .field("kind", &self.kind)
            .field("declared_deps", &self.declared_deps.len())
            .field("exported_deps", &self.exported_deps.len())
            .field("provided_deps", &self.provided_deps.len())
            .field("extra_deps", &self.extra_deps.len())
            .finish_non_exhaustive()
    }
}

/// Immutable DAG of target nodes, keyed by identity.
#[derive(Debug, Default)]
pub struct TargetGraph {
    nodes: HashMap<TargetIdentity, TargetNode>,
}

impl TargetGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble a graph from nodes.
    ///
    /// A dependency is satisfied by a node with the exact identity or, for a
    /// flavored dependency, by the node of its unflavored identity.
    ///
    /// # Errors
    /// Returns an error if a target is declared twice, a dependency names a
    /// target that is not in the graph, or the dependencies form a cycle.
    pub fn new(nodes: impl IntoIterator<Item = TargetNode>) -> Result<Self, EngineError> {
        let mut map = HashMap::new();
        for node in nodes {
            let target = node.target().clone();
            if map.insert(target.clone(), node).is_some() {
                return Err(EngineError::DuplicateNode { target });
            }
        }

        let graph = Self { nodes: map };
        let roots: Vec<TargetIdentity> = graph.targets().into_iter().cloned().collect();
        topological_order(roots, |target| {
            let Some(node) = graph.nodes.get(target) else {
                return Ok(Vec::new());
            };
            node.edges()
                .into_iter()
                .map(|edge| {
                    graph
                        .node_key(&edge.dependency)
                        .ok_or(EngineError::MissingDependency {
                            target: edge.source,
                            dependency: edge.dependency,
                        })
                })
                .collect()
        })?;

        Ok(graph)
    }

    /// The key of the node that satisfies a dependency on `target`.
    fn node_key(&self, target: &TargetIdentity) -> Option<TargetIdentity> {
        if self.nodes.contains_key(target) {
            return Some(target.clone());
        }
        let base = target.without_flavors();
        self.nodes.contains_key(&base).then_some(base)
    }

    /// Look up the node registered under exactly `target`.
    pub fn get(&self, target: &TargetIdentity) -> Option<&TargetNode> {
        self.nodes.get(target)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All targets in the graph, sorted.
    pub fn targets(&self) -> Vec<&TargetIdentity> {
        let mut targets: Vec<_> = self.nodes.keys().collect();
        targets.sort();
        targets
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(text: &str) -> TargetIdentity {
        TargetIdentity::parse(text).unwrap()
    }

    #[derive(Debug, PartialEq)]
    struct Args {
        label: &'static str,
    }

    #[test]
    fn args_downcast() {
        let node = TargetNode::new(t("//a:a"), "thing", Args { label: "x" });
        assert_eq!(node.args::<Args>(), Some(&Args { label: "x" }));
        assert!(node.args::<String>().is_none());
    }

    #[test]
    fn require_args_names_target() {
        let node = TargetNode::new(t("//a:a"), "thing", Args { label: "x" });
        let err = node.require_args::<String>().unwrap_err().to_string();
        assert!(err.contains("//a:a"), "error was: {err}");
        assert!(err.contains("thing"), "error was: {err}");
    }

    #[test]
    fn edges_cover_every_kind() {
        let node = TargetNode::new(t("//a:a"), "thing", ())
            .with_dep(DependencyKind::Declared, t("//b:b"))
            .with_dep(DependencyKind::Exported, t("//c:c"))
            .with_dep(DependencyKind::Provided, t("//d:d"))
            .with_dep(DependencyKind::Extra, t("//e:e"));
        let kinds: Vec<_> = node.edges().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DependencyKind::Declared,
                DependencyKind::Exported,
                DependencyKind::Provided,
                DependencyKind::Extra,
            ]
        );
        assert!(node.edges().iter().all(|e| e.source == t("//a:a")));
    }

    #[test]
    fn graph_rejects_duplicate_nodes() {
        let result = TargetGraph::new([
            TargetNode::new(t("//a:a"), "thing", ()),
            TargetNode::new(t("//a:a"), "thing", ()),
        ]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("more than once"), "error was: {err}");
    }

    #[test]
    fn graph_rejects_missing_dependency() {
        let result = TargetGraph::new([TargetNode::new(t("//a:a"), "thing", ())
            .with_dep(DependencyKind::Declared, t("//missing:dep"))]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("//missing:dep"), "error was: {err}");
    }

    #[test]
    fn flavored_dependency_satisfied_by_base_node() {
        let graph = TargetGraph::new([
            TargetNode::new(t("//a:a"), "thing", ())
                .with_dep(DependencyKind::Declared, t("//b:b#class-abi")),
            TargetNode::new(t("//b:b"), "thing", ()),
        ])
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.get(&t("//b:b#class-abi")).is_none());
        assert!(graph.get(&t("//b:b")).is_some());
    }

    #[test]
    fn graph_rejects_cycles() {
        let result = TargetGraph::new([
            TargetNode::new(t("//a:a"), "thing", ()).with_dep(DependencyKind::Declared, t("//b:b")),
            TargetNode::new(t("//b:b"), "thing", ())
                .with_dep(DependencyKind::Exported, t("//a:a#class-abi")),
        ]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("cycle"), "error was: {err}");
    }

    #[test]
    fn targets_are_sorted() {
        let graph = TargetGraph::new([
            TargetNode::new(t("//z:z"), "thing", ()),
            TargetNode::new(t("//a:a"), "thing", ()),
        ])
        .unwrap();
        let targets: Vec<String> = graph.targets().iter().map(ToString::to_string).collect();
        assert_eq!(targets, vec!["//a:a", "//z:z"]);
    }
}
