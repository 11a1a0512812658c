//! The target→rule registry.
//!
//! Every target maps to at most one rule for the lifetime of a resolver.
//! Construction is lazy and happens exactly once per target, even when many
//! threads ask for the same target at the same time. Locking is per target:
//! the map's shard lock is only held while fetching a target's slot, and the
//! slot's once-cell serializes construction of that one target.
//!
//! A slot is also claimed while a thread produces its rule. Indexing a rule
//! into a claimed slot fails at once instead of waiting on the claimant.

use std::any::type_name;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use keel_target::TargetIdentity;
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::graph::{TargetGraph, TargetNode};
use crate::rule::{downcast_rule, BuildRule, RuleRef, RuleSet};
use crate::transformer::TransformerRegistry;

#[derive(Debug, Default)]
struct Slot {
    rule: OnceCell<RuleRef>,
    /// Held by the thread currently producing `rule`.
    claimed: AtomicBool,
}

/// Exclusive right to produce a slot's rule; released on drop.
struct Claim<'a>(&'a AtomicBool);

impl<'a> Claim<'a> {
    fn take(slot: &'a Slot) -> Option<Self> {
        slot.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(&slot.claimed))
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Why a slot's once-cell was left empty.
enum SlotError {
    /// Another thread is indexing a finished rule into the slot.
    Claimed,
    Failed(EngineError),
}

static NEXT_RESOLVER_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Targets this thread is currently constructing, outermost first.
    static CONSTRUCTING: RefCell<Vec<(usize, TargetIdentity)>> = const { RefCell::new(Vec::new()) };
}

/// Memoized registry of build rules, backed by a target graph.
#[derive(Debug)]
pub struct RuleResolver {
    id: usize,
    graph: TargetGraph,
    transformers: TransformerRegistry,
    rules: DashMap<TargetIdentity, Arc<Slot>>,
}

impl RuleResolver {
    pub fn new(graph: TargetGraph, transformers: TransformerRegistry) -> Self {
        Self {
            id: NEXT_RESOLVER_ID.fetch_add(1, Ordering::Relaxed),
            graph,
            transformers,
            rules: DashMap::new(),
        }
    }

    pub fn graph(&self) -> &TargetGraph {
        &self.graph
    }

    /// Return the rule for `target`, constructing it with `constructor` if
    /// no rule is registered yet.
    ///
    /// `constructor` runs at most once per target across all threads; every
    /// caller receives the same rule instance. If it fails, the target stays
    /// unregistered and a later call may try again.
    ///
    /// # Errors
    /// Returns the constructor's error, [`EngineError::DependencyCycle`] if
    /// the target is already being constructed further up this thread's
    /// stack, or [`EngineError::TargetMismatch`] if the constructor built a
    /// rule for another target.
    pub fn compute_if_absent<F>(
        &self,
        target: &TargetIdentity,
        constructor: F,
    ) -> Result<RuleRef, EngineError>
    where
        F: FnOnce(&TargetIdentity) -> Result<RuleRef, EngineError>,
    {
        let slot = self.slot(target);
        if let Some(rule) = slot.rule.get() {
            trace!(target = %target, "reusing rule");
            return Ok(Arc::clone(rule));
        }

        let result = self.construct(&slot, target, constructor);
        if result.is_err() {
            self.discard_empty_slot(target, &slot);
        }
        result
    }

    fn construct<F>(
        &self,
        slot: &Slot,
        target: &TargetIdentity,
        constructor: F,
    ) -> Result<RuleRef, EngineError>
    where
        F: FnOnce(&TargetIdentity) -> Result<RuleRef, EngineError>,
    {
        let _guard = ConstructionGuard::enter(self.id, target)?;
        let init = slot.rule.get_or_try_init(|| {
            let Some(_claim) = Claim::take(slot) else {
                return Err(SlotError::Claimed);
            };
            let rule = constructor(target).map_err(SlotError::Failed)?;
            if rule.target() != target {
                return Err(SlotError::Failed(EngineError::TargetMismatch {
                    requested: target.clone(),
                    actual: rule.target().clone(),
                }));
            }
            debug!(target = %target, rule_type = rule.rule_type(), "constructed rule");
            Ok(rule)
        });
        match init {
            Ok(rule) => Ok(Arc::clone(rule)),
            // The indexing thread never waits on anything, so this returns.
            Err(SlotError::Claimed) => Ok(Arc::clone(slot.rule.wait())),
            Err(SlotError::Failed(err)) => Err(err),
        }
    }

    /// Register a fully built rule.
    ///
    /// Never blocks on a construction in progress: a target being constructed
    /// on any thread counts as taken.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateRule`] if a rule for the same target is
    /// already registered or under construction.
    pub fn add_to_index(&self, rule: RuleRef) -> Result<RuleRef, EngineError> {
        let target = rule.target().clone();
        let slot = self.slot(&target);
        if slot.rule.get().is_some() {
            return Err(EngineError::DuplicateRule { target });
        }
        let Some(_claim) = Claim::take(&slot) else {
            return Err(EngineError::DuplicateRule { target });
        };
        // Waits at most for a constructor that is about to find the claim taken.
        let stored = slot.rule.get_or_init(|| Arc::clone(&rule));
        if !Arc::ptr_eq(stored, &rule) {
            return Err(EngineError::DuplicateRule { target });
        }
        debug!(target = %target, rule_type = rule.rule_type(), "indexed rule");
        Ok(rule)
    }

    /// Look up a registered rule without constructing it.
    ///
    /// # Errors
    /// Returns [`EngineError::UnresolvedTarget`] if no rule is registered.
    pub fn get_rule(&self, target: &TargetIdentity) -> Result<RuleRef, EngineError> {
        self.get_rule_optional(target)
            .ok_or_else(|| EngineError::UnresolvedTarget {
                target: target.clone(),
            })
    }

    /// Look up a registered rule, returning `None` if there is none.
    pub fn get_rule_optional(&self, target: &TargetIdentity) -> Option<RuleRef> {
        let slot = self.rules.get(target)?;
        slot.value().rule.get().cloned()
    }

    /// Look up a registered rule and downcast it to `R`.
    ///
    /// # Errors
    /// Returns [`EngineError::UnresolvedTarget`] if no rule is registered, or
    /// [`EngineError::TypeMismatch`] if the rule is not an `R`.
    pub fn get_rule_with_type<R: BuildRule>(
        &self,
        target: &TargetIdentity,
    ) -> Result<Arc<R>, EngineError> {
        let rule = self.get_rule(target)?;
        downcast_rule::<R>(&rule).ok_or_else(|| EngineError::TypeMismatch {
            target: target.clone(),
            expected: type_name::<R>(),
            actual: rule.rule_type(),
        })
    }

    /// Return the rule for `target`, building it from the target graph if
    /// necessary.
    ///
    /// A flavored target without a node of its own is built from its
    /// unflavored node when that node's transformer accepts the flavors.
    ///
    /// # Errors
    /// Returns [`EngineError::NoTargetNode`] if the graph has no node for the
    /// target, [`EngineError::NoTransformer`] if no transformer handles the
    /// node's kind, or any error raised while transforming the node.
    pub fn require_rule(&self, target: &TargetIdentity) -> Result<RuleRef, EngineError> {
        self.compute_if_absent(target, |target| {
            let node = self.node_for(target)?;
            let transformer =
                self.transformers
                    .get(node.kind())
                    .ok_or_else(|| EngineError::NoTransformer {
                        kind: node.kind().to_owned(),
                        target: target.clone(),
                    })?;
            transformer.transform(&node, self)
        })
    }

    /// [`require_rule`](Self::require_rule) followed by a downcast to `R`.
    ///
    /// # Errors
    /// Returns the errors of `require_rule`, or
    /// [`EngineError::TypeMismatch`] if the rule is not an `R`.
    pub fn require_rule_with_type<R: BuildRule>(
        &self,
        target: &TargetIdentity,
    ) -> Result<Arc<R>, EngineError> {
        let rule = self.require_rule(target)?;
        downcast_rule::<R>(&rule).ok_or_else(|| EngineError::TypeMismatch {
            target: target.clone(),
            expected: type_name::<R>(),
            actual: rule.rule_type(),
        })
    }

    /// Require every target in order.
    ///
    /// # Errors
    /// Returns the first error raised while requiring a target.
    pub fn get_all_rules<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a TargetIdentity>,
    ) -> Result<Vec<RuleRef>, EngineError> {
        targets
            .into_iter()
            .map(|target| self.require_rule(target))
            .collect()
    }

    /// Require every target and collect the rules into a [`RuleSet`].
    ///
    /// # Errors
    /// Returns the first error raised while requiring a target.
    pub fn rule_set<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a TargetIdentity>,
    ) -> Result<RuleSet, EngineError> {
        Ok(self.get_all_rules(targets)?.into_iter().collect())
    }

    /// The ABI rule of every rule in `rules`.
    ///
    /// # Errors
    /// Returns [`EngineError::NoAbi`] if a rule has no ABI, or any error
    /// raised while requiring an ABI rule.
    pub fn abi_rules<'a>(
        &self,
        rules: impl IntoIterator<Item = &'a RuleRef>,
    ) -> Result<RuleSet, EngineError> {
        rules
            .into_iter()
            .map(|rule| {
                let abi = rule.abi_target().ok_or_else(|| EngineError::NoAbi {
                    target: rule.target().clone(),
                })?;
                self.require_rule(abi)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|rules| rules.into_iter().collect())
    }

    /// Like [`abi_rules`](Self::abi_rules), but rules without an ABI are kept
    /// as they are.
    ///
    /// # Errors
    /// Returns any error raised while requiring an ABI rule.
    pub fn abi_rules_where_possible<'a>(
        &self,
        rules: impl IntoIterator<Item = &'a RuleRef>,
    ) -> Result<RuleSet, EngineError> {
        let mut result = RuleSet::new();
        for rule in rules {
            match rule.abi_target() {
                Some(abi) => {
                    let abi_rule = self.require_rule(abi)?;
                    trace!(target = %rule.target(), abi = %abi, "substituting abi rule");
                    result.insert(abi_rule);
                }
                None => {
                    result.insert(Arc::clone(rule));
                }
            }
        }
        Ok(result)
    }

    /// Targets with a registered rule, sorted.
    pub fn registered_targets(&self) -> Vec<TargetIdentity> {
        let mut targets: Vec<TargetIdentity> = self
            .rules
            .iter()
            .filter(|entry| entry.value().rule.get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        targets.sort();
        targets
    }

    fn slot(&self, target: &TargetIdentity) -> Arc<Slot> {
        if let Some(slot) = self.rules.get(target) {
            return Arc::clone(slot.value());
        }
        let entry = self.rules.entry(target.clone()).or_default();
        Arc::clone(entry.value())
    }

    /// Forget `target`'s slot if it holds no rule and no other caller holds it.
    fn discard_empty_slot(&self, target: &TargetIdentity, slot: &Arc<Slot>) {
        // The map and `slot` account for two references.
        let removed = self.rules.remove_if(target, |_, entry| {
            Arc::ptr_eq(entry, slot) && entry.rule.get().is_none() && Arc::strong_count(entry) <= 2
        });
        if removed.is_some() {
            trace!(target = %target, "discarded empty slot");
        }
    }

    fn node_for(&self, target: &TargetIdentity) -> Result<TargetNode, EngineError> {
        if let Some(node) = self.graph.get(target) {
            return Ok(node.clone());
        }
        if target.is_flavored() {
            if let Some(node) = self.graph.get(&target.without_flavors()) {
                let accepts = self
                    .transformers
                    .get(node.kind())
                    .is_some_and(|t| t.supports_flavors(target.flavors()));
                if accepts {
                    return Ok(node.retarget(target.clone()));
                }
            }
        }
        Err(EngineError::NoTargetNode {
            target: target.clone(),
        })
    }
}

/// Marks a target as under construction on the current thread.
struct ConstructionGuard;

impl ConstructionGuard {
    fn enter(resolver: usize, target: &TargetIdentity) -> Result<Self, EngineError> {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            let start = stack
                .iter()
                .position(|(id, t)| *id == resolver && t == target);
            if let Some(start) = start {
                let mut cycle: Vec<String> = stack
                    .get(start..)
                    .unwrap_or_default()
                    .iter()
                    .filter(|(id, _)| *id == resolver)
                    .map(|(_, t)| t.to_string())
                    .collect();
                cycle.push(target.to_string());
                return Err(EngineError::DependencyCycle {
                    cycle: cycle.join(" -> "),
                });
            }
            stack.push((resolver, target.clone()));
            Ok(Self)
        })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    use keel_target::Flavor;

    use super::*;
    use crate::graph::DependencyKind;
    use crate::prebuilt::{PrebuiltArgs, PrebuiltRule, PrebuiltTransformer, PREBUILT_KIND};
    use crate::transformer::RuleTransformer;

    fn t(text: &str) -> TargetIdentity {
        TargetIdentity::parse(text).unwrap()
    }

    fn prebuilt(text: &str) -> RuleRef {
        Arc::new(PrebuiltRule::new(t(text), text, RuleSet::new(), RuleSet::new()))
    }

    fn node(text: &str) -> TargetNode {
        TargetNode::new(t(text), PREBUILT_KIND, PrebuiltArgs::new(text))
    }

    fn resolver(nodes: Vec<TargetNode>) -> RuleResolver {
        RuleResolver::new(
            TargetGraph::new(nodes).unwrap(),
            TransformerRegistry::new().with(PREBUILT_KIND, PrebuiltTransformer),
        )
    }

    #[derive(Debug)]
    struct OtherRule {
        target: TargetIdentity,
        deps: RuleSet,
    }

    impl BuildRule for OtherRule {
        fn target(&self) -> &TargetIdentity {
            &self.target
        }
        fn rule_type(&self) -> &'static str {
            "other"
        }
        fn build_deps(&self) -> &RuleSet {
            &self.deps
        }
        fn input_digest(&self) -> Result<String, EngineError> {
            Ok(String::new())
        }
        fn output_digest(&self) -> Result<String, EngineError> {
            Ok(String::new())
        }
    }

    #[test]
    fn compute_if_absent_constructs_once() {
        let resolver = resolver(Vec::new());
        let calls = AtomicUsize::new(0);
        let target = t("//foo:bar");

        let first = resolver
            .compute_if_absent(&target, |target| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(prebuilt(&target.to_string()))
            })
            .unwrap();
        let second = resolver
            .compute_if_absent(&target, |target| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(prebuilt(&target.to_string()))
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn add_to_index_rejects_duplicates() {
        let resolver = resolver(Vec::new());
        resolver
            .compute_if_absent(&t("//foo:bar"), |target| Ok(prebuilt(&target.to_string())))
            .unwrap();

        let err = resolver
            .add_to_index(prebuilt("//foo:bar"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("//foo:bar"), "error was: {err}");
        assert!(err.contains("already been created"), "error was: {err}");
    }

    #[test]
    fn indexing_the_target_under_construction_fails() {
        let resolver = resolver(Vec::new());
        let err = resolver
            .compute_if_absent(&t("//foo:bar"), |target| {
                resolver.add_to_index(prebuilt(&target.to_string()))
            })
            .unwrap_err()
            .to_string();
        assert!(err.contains("already been created"), "error was: {err}");
    }

    #[test]
    fn compute_if_absent_returns_indexed_rule() {
        let resolver = resolver(Vec::new());
        let calls = AtomicUsize::new(0);
        let indexed = resolver.add_to_index(prebuilt("//foo:bar")).unwrap();
        let found = resolver
            .compute_if_absent(&t("//foo:bar"), |target| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(prebuilt(&target.to_string()))
            })
            .unwrap();
        assert!(Arc::ptr_eq(&indexed, &found));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn require_rule_builds_from_node() {
        let resolver = resolver(vec![node("//foo:bar")]);
        let rule = resolver.require_rule(&t("//foo:bar")).unwrap();
        assert_eq!(rule.target(), &t("//foo:bar"));
        assert!(Arc::ptr_eq(
            &rule,
            &resolver.require_rule(&t("//foo:bar")).unwrap()
        ));
        assert_eq!(resolver.registered_targets(), vec![t("//foo:bar")]);
    }

    #[test]
    fn require_rule_resolves_dependencies_first() {
        let resolver = resolver(vec![
            node("//app:app").with_dep(DependencyKind::Declared, t("//lib:lib")),
            node("//lib:lib"),
        ]);
        let app = resolver.require_rule(&t("//app:app")).unwrap();
        let lib = resolver.get_rule(&t("//lib:lib")).unwrap();
        assert!(Arc::ptr_eq(app.build_deps().get(&t("//lib:lib")).unwrap(), &lib));
    }

    #[test]
    fn require_rule_without_node_fails() {
        let resolver = resolver(Vec::new());
        let err = resolver
            .require_rule(&t("//nowhere:thing"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("could not be resolved"), "error was: {err}");
        assert!(err.contains("//nowhere:thing"), "error was: {err}");
    }

    #[test]
    fn flavored_target_needs_accepting_transformer() {
        let resolver = resolver(vec![node("//foo:bar")]);
        let err = resolver
            .require_rule(&t("//foo:bar#class-abi"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("no such node"), "error was: {err}");
    }

    #[test]
    fn flavored_target_built_from_base_node() {
        struct Flavored;

        impl RuleTransformer for Flavored {
            fn transform(
                &self,
                node: &TargetNode,
                _resolver: &RuleResolver,
            ) -> Result<RuleRef, EngineError> {
                Ok(Arc::new(PrebuiltRule::new(
                    node.target().clone(),
                    "flavored",
                    RuleSet::new(),
                    RuleSet::new(),
                )))
            }

            fn supports_flavors(&self, flavors: &std::collections::BTreeSet<Flavor>) -> bool {
                flavors.contains(&Flavor::from_static("class-abi"))
            }
        }

        let resolver = RuleResolver::new(
            TargetGraph::new([node("//foo:bar")]).unwrap(),
            TransformerRegistry::new().with(PREBUILT_KIND, Flavored),
        );
        let rule = resolver.require_rule(&t("//foo:bar#class-abi")).unwrap();
        assert_eq!(rule.target(), &t("//foo:bar#class-abi"));
    }

    #[test]
    fn missing_transformer_is_reported() {
        let resolver = RuleResolver::new(
            TargetGraph::new([node("//foo:bar")]).unwrap(),
            TransformerRegistry::new(),
        );
        let err = resolver
            .require_rule(&t("//foo:bar"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("no rule transformer"), "error was: {err}");
    }

    #[test]
    fn get_rule_with_type_unregistered() {
        let resolver = resolver(Vec::new());
        let err = resolver
            .get_rule_with_type::<PrebuiltRule>(&t("//foo:bar"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("could not be resolved"), "error was: {err}");
    }

    #[test]
    fn get_rule_with_type_wrong_kind() {
        let resolver = resolver(Vec::new());
        resolver.add_to_index(prebuilt("//foo:bar")).unwrap();

        assert!(resolver
            .get_rule_with_type::<PrebuiltRule>(&t("//foo:bar"))
            .is_ok());
        let err = resolver
            .get_rule_with_type::<OtherRule>(&t("//foo:bar"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("not of expected type"), "error was: {err}");
        assert!(err.contains("//foo:bar"), "error was: {err}");
    }

    #[test]
    fn get_rule_optional_never_fails() {
        let resolver = resolver(vec![node("//foo:bar")]);
        assert!(resolver.get_rule_optional(&t("//foo:bar")).is_none());
        resolver.require_rule(&t("//foo:bar")).unwrap();
        assert!(resolver.get_rule_optional(&t("//foo:bar")).is_some());
    }

    #[test]
    fn get_rule_does_not_construct() {
        let resolver = resolver(vec![node("//foo:bar")]);
        assert!(resolver.get_rule(&t("//foo:bar")).is_err());
        assert!(resolver.registered_targets().is_empty());
    }

    #[test]
    fn get_all_rules_preserves_order() {
        let resolver = resolver(vec![node("//c:c"), node("//a:a"), node("//b:b")]);
        let targets = [t("//c:c"), t("//a:a"), t("//b:b")];
        let rules = resolver.get_all_rules(&targets).unwrap();
        let order: Vec<&TargetIdentity> = rules.iter().map(|r| r.target()).collect();
        assert_eq!(order, targets.iter().collect::<Vec<_>>());
    }

    #[test]
    fn abi_rules_require_an_abi() {
        let resolver = resolver(vec![node("//foo:bar")]);
        let rule = resolver.require_rule(&t("//foo:bar")).unwrap();

        let err = resolver.abi_rules([&rule]).unwrap_err().to_string();
        assert!(err.contains("does not have an ABI"), "error was: {err}");

        let kept = resolver.abi_rules_where_possible([&rule]).unwrap();
        assert!(Arc::ptr_eq(kept.get(&t("//foo:bar")).unwrap(), &rule));
    }

    #[test]
    fn failed_construction_can_be_retried() {
        let resolver = resolver(Vec::new());
        let target = t("//foo:bar");

        let result = resolver.compute_if_absent(&target, |target| {
            Err(EngineError::NoTargetNode {
                target: target.clone(),
            })
        });
        assert!(result.is_err());
        assert!(resolver.get_rule_optional(&target).is_none());

        let rule = resolver
            .compute_if_absent(&target, |target| Ok(prebuilt(&target.to_string())))
            .unwrap();
        assert_eq!(rule.target(), &target);
    }

    #[test]
    fn constructor_must_build_requested_target() {
        let resolver = resolver(Vec::new());
        let err = resolver
            .compute_if_absent(&t("//foo:bar"), |_| Ok(prebuilt("//foo:other")))
            .unwrap_err()
            .to_string();
        assert!(err.contains("//foo:other"), "error was: {err}");
        assert!(resolver.get_rule_optional(&t("//foo:bar")).is_none());
    }

    #[test]
    fn reentrant_construction_is_a_cycle() {
        let resolver = resolver(Vec::new());
        let target = t("//foo:bar");
        let err = resolver
            .compute_if_absent(&target, |outer| {
                resolver.compute_if_absent(outer, |inner| Ok(prebuilt(&inner.to_string())))
            })
            .unwrap_err()
            .to_string();
        assert!(err.contains("//foo:bar -> //foo:bar"), "error was: {err}");
        assert!(resolver.get_rule_optional(&target).is_none());
    }

    #[test]
    fn concurrent_callers_share_one_construction() {
        const THREADS: usize = 8;
        let resolver = resolver(Vec::new());
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);
        let target = t("//foo:bar");

        let rules: Vec<RuleRef> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        resolver
                            .compute_if_absent(&target, |target| {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::yield_now();
                                Ok(prebuilt(&target.to_string()))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = rules.first().unwrap();
        assert!(rules.iter().all(|rule| Arc::ptr_eq(rule, first)));
    }

    #[test]
    fn concurrent_require_of_shared_dependency() {
        const THREADS: usize = 4;
        let nodes: Vec<TargetNode> = (0..THREADS)
            .map(|i| {
                node(&format!("//app:app{i}")).with_dep(DependencyKind::Declared, t("//lib:lib"))
            })
            .chain([node("//lib:lib")])
            .collect();
        let resolver = resolver(nodes);
        let barrier = Barrier::new(THREADS);

        let libs: Vec<RuleRef> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let resolver = &resolver;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        let app = resolver.require_rule(&t(&format!("//app:app{i}"))).unwrap();
                        Arc::clone(app.build_deps().get(&t("//lib:lib")).unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = libs.first().unwrap();
        assert!(libs.iter().all(|lib| Arc::ptr_eq(lib, first)));
        assert_eq!(resolver.registered_targets().len(), THREADS + 1);
    }

    #[test]
    fn indexing_a_target_under_construction_elsewhere_fails_fast() {
        let resolver = Arc::new(resolver(Vec::new()));
        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = mpsc::channel();

        // Each thread constructs one target and, mid-construction, reaches for
        // the other one.
        {
            let (resolver, barrier, tx) = (Arc::clone(&resolver), Arc::clone(&barrier), tx.clone());
            thread::spawn(move || {
                let result = resolver.compute_if_absent(&t("//lib:lib"), |target| {
                    barrier.wait();
                    resolver.add_to_index(prebuilt("//lib:lib#aux"))?;
                    Ok(prebuilt(&target.to_string()))
                });
                tx.send(("lib", result.map(|_| ()).map_err(|e| e.to_string())))
                    .unwrap();
            });
        }
        {
            let (resolver, barrier) = (Arc::clone(&resolver), Arc::clone(&barrier));
            thread::spawn(move || {
                let result = resolver.compute_if_absent(&t("//lib:lib#aux"), |target| {
                    barrier.wait();
                    resolver.compute_if_absent(&t("//lib:lib"), |lib| {
                        Ok(prebuilt(&lib.to_string()))
                    })?;
                    Ok(prebuilt(&target.to_string()))
                });
                tx.send(("aux", result.map(|_| ()).map_err(|e| e.to_string())))
                    .unwrap();
            });
        }

        let mut results = std::collections::BTreeMap::new();
        for _ in 0..2 {
            let (name, result) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            results.insert(name, result);
        }

        let lib = results.get("lib").unwrap();
        let err = lib.as_ref().unwrap_err();
        assert!(err.contains("//lib:lib#aux"), "error was: {err}");
        assert!(err.contains("already been created"), "error was: {err}");
        assert!(results.get("aux").unwrap().is_ok());
        assert_eq!(
            resolver.registered_targets(),
            vec![t("//lib:lib"), t("//lib:lib#aux")]
        );
    }

    #[test]
    fn failed_lookups_leave_no_slots() {
        let resolver = resolver(Vec::new());
        for i in 0..100 {
            let target = t(&format!("//missing:m{i}"));
            assert!(resolver.require_rule(&target).is_err());
        }
        let err = resolver
            .compute_if_absent(&t("//foo:bar"), |_| Ok(prebuilt("//foo:other")))
            .unwrap_err();
        assert!(matches!(err, EngineError::TargetMismatch { .. }), "{err}");
        assert!(resolver.rules.is_empty());
        assert!(resolver.registered_targets().is_empty());
    }
}
