//! The materialized rule graph, grouped into dependency levels.

use std::collections::{BTreeMap, HashMap};

use keel_target::TargetIdentity;
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use tracing::debug;

use crate::error::EngineError;
use crate::rule::RuleRef;
use crate::rule_key::RuleKey;
use crate::topo::topological_order;

/// Every rule reachable from a set of roots, in leaves-first levels.
///
/// Rules in the same level do not depend on each other and can be evaluated
/// in parallel.
#[derive(Debug)]
pub struct ActionGraph {
    levels: Vec<Vec<RuleRef>>,
}

impl ActionGraph {
    /// Collect every rule reachable from `roots` through build deps.
    ///
    /// # Errors
    /// Returns an error if the build deps form a cycle.
    pub fn from_roots<'a>(
        roots: impl IntoIterator<Item = &'a RuleRef>,
    ) -> Result<Self, EngineError> {
        let mut by_target: HashMap<TargetIdentity, RuleRef> = HashMap::new();
        let mut root_targets = Vec::new();
        for root in roots {
            root_targets.push(root.target().clone());
            by_target.insert(root.target().clone(), RuleRef::clone(root));
        }

        let order = topological_order(root_targets, |target| {
            let Some(rule) = by_target.get(target).cloned() else {
                return Ok(Vec::new());
            };
            let mut deps = Vec::new();
            for dep in rule.build_deps() {
                by_target
                    .entry(dep.target().clone())
                    .or_insert_with(|| RuleRef::clone(dep));
                deps.push(dep.target().clone());
            }
            Ok(deps)
        })?;

        // Dependencies precede dependents in `order`, so each rule's level is
        // known once its deps have been seen.
        let mut level_of: HashMap<TargetIdentity, usize> = HashMap::new();
        let mut levels: Vec<Vec<RuleRef>> = Vec::new();
        for target in order {
            let Some(rule) = by_target.get(&target) else {
                continue;
            };
            let level = rule
                .build_deps()
                .targets()
                .filter_map(|dep| level_of.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(target, level);
            while levels.len() <= level {
                levels.push(Vec::new());
            }
            if let Some(bucket) = levels.get_mut(level) {
                bucket.push(RuleRef::clone(rule));
            }
        }

        debug!(rules = level_of.len(), levels = levels.len(), "built action graph");
        Ok(Self { levels })
    }

    /// The rules grouped by level, leaves first.
    pub fn levels(&self) -> &[Vec<RuleRef>] {
        &self.levels
    }

    /// Number of rules in the graph.
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Compute the key of every rule.
    ///
    /// Levels are processed in order; rules within a level are keyed in
    /// parallel. Keying a rule forces its dependencies' output digests, which
    /// earlier levels have already computed.
    ///
    /// # Errors
    /// Returns the first error raised while keying a rule.
    pub fn rule_keys(&self) -> Result<BTreeMap<TargetIdentity, RuleKey>, EngineError> {
        let mut keys = BTreeMap::new();
        for level in &self.levels {
            let results: Vec<Result<(TargetIdentity, RuleKey), EngineError>> = level
                .par_iter()
                .map(|rule| {
                    let key = RuleKey::compute(rule.as_ref())?;
                    Ok((rule.target().clone(), key))
                })
                .collect();
            for result in results {
                let (target, key) = result?;
                keys.insert(target, key);
            }
        }
        Ok(keys)
    }

    /// Compute the output digest of every rule, level by level.
    ///
    /// # Errors
    /// Returns the first error raised while producing an output.
    pub fn evaluate(&self) -> Result<BTreeMap<TargetIdentity, String>, EngineError> {
        let mut digests = BTreeMap::new();
        for level in &self.levels {
            let results: Vec<Result<(TargetIdentity, String), EngineError>> = level
                .par_iter()
                .map(|rule| Ok((rule.target().clone(), rule.output_digest()?)))
                .collect();
            for result in results {
                let (target, digest) = result?;
                digests.insert(target, digest);
            }
        }
        Ok(digests)
    }
}

/// Targets whose rule key differs between two evaluations, or that exist in
/// only one of them.
pub fn changed_targets(
    before: &BTreeMap<TargetIdentity, RuleKey>,
    after: &BTreeMap<TargetIdentity, RuleKey>,
) -> Vec<TargetIdentity> {
    let mut changed: Vec<TargetIdentity> = after
        .iter()
        .filter(|(target, key)| before.get(*target) != Some(*key))
        .map(|(target, _)| target.clone())
        .collect();
    changed.extend(
        before
            .keys()
            .filter(|target| !after.contains_key(*target))
            .cloned(),
    );
    changed.sort();
    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::prebuilt::PrebuiltRule;
    use crate::rule::RuleSet;

    fn t(text: &str) -> TargetIdentity {
        TargetIdentity::parse(text).unwrap()
    }

    fn rule(text: &str, contents: &str, deps: &[&RuleRef]) -> RuleRef {
        let deps: RuleSet = deps.iter().map(|d| RuleRef::clone(d)).collect();
        Arc::new(PrebuiltRule::new(t(text), contents, deps, RuleSet::new()))
    }

    fn names(level: &[RuleRef]) -> Vec<String> {
        let mut names: Vec<String> = level.iter().map(|r| r.target().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn levels_are_leaves_first() {
        let c = rule("//c:c", "c", &[]);
        let d = rule("//d:d", "d", &[]);
        let b = rule("//b:b", "b", &[&c, &d]);
        let a = rule("//a:a", "a", &[&b, &c]);

        let graph = ActionGraph::from_roots([&a]).unwrap();
        let levels: Vec<Vec<String>> = graph.levels().iter().map(Vec::as_slice).map(names).collect();
        assert_eq!(
            levels,
            vec![
                vec!["//c:c".to_owned(), "//d:d".to_owned()],
                vec!["//b:b".to_owned()],
                vec!["//a:a".to_owned()],
            ]
        );
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn shared_roots_counted_once() {
        let c = rule("//c:c", "c", &[]);
        let a = rule("//a:a", "a", &[&c]);
        let b = rule("//b:b", "b", &[&c]);
        let graph = ActionGraph::from_roots([&a, &b, &c]).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn rule_keys_cover_every_rule() {
        let c = rule("//c:c", "c", &[]);
        let a = rule("//a:a", "a", &[&c]);
        let keys = ActionGraph::from_roots([&a]).unwrap().rule_keys().unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn leaf_change_invalidates_dependents_only() {
        let keys_for = |leaf_contents: &str| {
            let c = rule("//c:c", leaf_contents, &[]);
            let other = rule("//other:other", "other", &[]);
            let b = rule("//b:b", "b", &[&c]);
            let a = rule("//a:a", "a", &[&b, &other]);
            ActionGraph::from_roots([&a]).unwrap().rule_keys().unwrap()
        };

        let changed = changed_targets(&keys_for("v1"), &keys_for("v2"));
        // `b` depends on `c`'s output directly. `a` only sees `b`'s output,
        // which for a prebuilt does not change.
        assert_eq!(changed, vec![t("//b:b"), t("//c:c")]);
    }

    #[test]
    fn evaluate_returns_output_digests() {
        let c = rule("//c:c", "c", &[]);
        let digests = ActionGraph::from_roots([&c]).unwrap().evaluate().unwrap();
        assert_eq!(
            digests.get(&t("//c:c")),
            Some(&c.output_digest().unwrap())
        );
    }

    #[test]
    fn changed_targets_reports_removed_rules() {
        let gone = rule("//gone:gone", "x", &[]);
        let mut before = BTreeMap::new();
        before.insert(t("//gone:gone"), RuleKey::compute(gone.as_ref()).unwrap());
        let after = BTreeMap::new();
        assert_eq!(changed_targets(&before, &after), vec![t("//gone:gone")]);
    }
}
