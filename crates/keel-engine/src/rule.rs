//! Materialized build rules and ordered rule sets.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use keel_target::TargetIdentity;

use crate::error::EngineError;

/// Upcasting support for trait objects, so rules can be downcast by callers
/// that know the concrete rule type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A materialized, artifact-producing node of the action graph.
///
/// Rules are immutable once constructed; the resolver hands out shared
/// [`RuleRef`]s and every holder of the same target sees the same instance.
pub trait BuildRule: AsAny + fmt::Debug {
    /// The target this rule was built for.
    fn target(&self) -> &TargetIdentity;

    /// A short, stable name for the kind of rule (e.g. `"java_library"`).
    fn rule_type(&self) -> &'static str;

    /// Every rule that must be built before this one.
    fn build_deps(&self) -> &RuleSet;

    /// The logical API dependencies; excludes tooling-only dependencies.
    fn declared_deps(&self) -> &RuleSet {
        self.build_deps()
    }

    /// The artifact produced, if any.
    fn output(&self) -> Option<&ArtifactRef> {
        None
    }

    /// Rules this rule re-exports to its consumers, if it re-exports at all.
    fn exported_deps(&self) -> Option<&RuleSet> {
        None
    }

    /// The target of this rule's ABI rule, if it has one.
    fn abi_target(&self) -> Option<&TargetIdentity> {
        None
    }

    /// Digest of everything the rule itself contributes to its output:
    /// sources, arguments, configuration. Dependencies are excluded.
    ///
    /// # Errors
    /// Returns an error if the inputs cannot be serialized.
    fn input_digest(&self) -> Result<String, EngineError>;

    /// Content digest of the rule's output. Implementations compute it once.
    ///
    /// # Errors
    /// Returns an error if producing the output fails.
    fn output_digest(&self) -> Result<String, EngineError>;
}

/// Shared handle to a rule owned by the resolver.
pub type RuleRef = Arc<dyn BuildRule>;

/// Downcast a shared rule to its concrete type.
pub fn downcast_rule<R: BuildRule>(rule: &RuleRef) -> Option<Arc<R>> {
    Arc::clone(rule).into_any().downcast::<R>().ok()
}

/// Location of a rule's output relative to the build output root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactRef {
    owner: TargetIdentity,
    path: PathBuf,
}

impl ArtifactRef {
    /// Build the conventional generated-output path for `owner`:
    /// `keel-out/gen/<base_path>/<name>[__<flavors>]/<file_name>`.
    pub fn generated(owner: &TargetIdentity, file_name: &str) -> Self {
        let mut dir = owner.name().to_owned();
        if owner.is_flavored() {
            let flavors: Vec<&str> = owner.flavors().iter().map(|f| f.as_str()).collect();
            dir.push_str("__");
            dir.push_str(&flavors.join(","));
        }
        let path = PathBuf::from("keel-out")
            .join("gen")
            .join(owner.base_path())
            .join(dir)
            .join(file_name);
        Self {
            owner: owner.clone(),
            path,
        }
    }

    pub fn owner(&self) -> &TargetIdentity {
        &self.owner
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// A set of rules, deduplicated and ordered by target identity.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: BTreeMap<TargetIdentity, RuleRef>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule. Returns `false` if a rule for the same target was
    /// already present; the existing rule is kept.
    pub fn insert(&mut self, rule: RuleRef) -> bool {
        if self.rules.contains_key(rule.target()) {
            return false;
        }
        self.rules.insert(rule.target().clone(), rule);
        true
    }

    pub fn contains(&self, target: &TargetIdentity) -> bool {
        self.rules.contains_key(target)
    }

    pub fn get(&self, target: &TargetIdentity) -> Option<&RuleRef> {
        self.rules.get(target)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in target order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleRef> {
        self.rules.values()
    }

    /// Targets in order.
    pub fn targets(&self) -> impl Iterator<Item = &TargetIdentity> {
        self.rules.keys()
    }

    /// Rules present in either set.
    pub fn union(&self, other: &RuleSet) -> RuleSet {
        let mut merged = self.clone();
        merged.extend(other.iter().cloned());
        merged
    }

    /// Rules present in `self` but not in `other`, compared by target.
    pub fn difference(&self, other: &RuleSet) -> RuleSet {
        self.iter()
            .filter(|rule| !other.contains(rule.target()))
            .cloned()
            .collect()
    }
}

impl FromIterator<RuleRef> for RuleSet {
    fn from_iter<I: IntoIterator<Item = RuleRef>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<RuleRef> for RuleSet {
    fn extend<I: IntoIterator<Item = RuleRef>>(&mut self, iter: I) {
        for rule in iter {
            self.insert(rule);
        }
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a RuleRef;
    type IntoIter = std::collections::btree_map::Values<'a, TargetIdentity, RuleRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.values()
    }
}

/// Every rule transitively re-exported by `rules`.
///
/// The input rules themselves are not included unless another input
/// re-exports them.
pub fn exported_rules<'a>(rules: impl IntoIterator<Item = &'a RuleRef>) -> RuleSet {
    let mut exported = RuleSet::new();
    let mut pending: Vec<RuleRef> = rules
        .into_iter()
        .filter_map(|rule| rule.exported_deps())
        .flat_map(|deps| deps.iter().cloned())
        .collect();

    while let Some(rule) = pending.pop() {
        if let Some(deps) = rule.exported_deps() {
            pending.extend(
                deps.iter()
                    .filter(|dep| !exported.contains(dep.target()))
                    .cloned(),
            );
        }
        exported.insert(rule);
    }
    exported
}
