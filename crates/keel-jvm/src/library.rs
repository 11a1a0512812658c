//! The compiled library rule and its classpath.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use keel_engine::{downcast_rule, ArtifactRef, BuildRule, EngineError, RuleRef, RuleSet};
use keel_target::TargetIdentity;
use keel_util::hash::{sha256_bytes, sha256_multi};

use crate::abi::{CalculateAbiFromClasses, CalculateAbiFromSource, CompareAbis};
use crate::args::JavaLibraryArgs;
use crate::compiler::ClassCompiler;
use crate::error::JvmError;
use crate::flavor::library_target;
use crate::jar::Jar;

/// Target kind handled by [`JavaLibraryTransformer`](crate::JavaLibraryTransformer).
pub const JAVA_LIBRARY_KIND: &str = "java_library";

/// One jar on a compile-time classpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    /// The library the jar stands for.
    pub dependency: TargetIdentity,
    pub artifact: ArtifactRef,
}

impl ClasspathEntry {
    /// Whether an ABI jar was substituted for the library's full jar.
    pub fn is_abi(&self) -> bool {
        self.artifact.owner() != &self.dependency
    }
}

/// A compiled JVM library.
#[derive(Debug)]
pub struct JavaLibraryRule {
    pub(crate) target: TargetIdentity,
    pub(crate) args: Arc<JavaLibraryArgs>,
    pub(crate) compiler: Arc<dyn ClassCompiler>,
    pub(crate) declared_deps: RuleSet,
    pub(crate) exported_deps: RuleSet,
    pub(crate) provided_deps: RuleSet,
    pub(crate) build_deps: RuleSet,
    pub(crate) classpath_rules: RuleSet,
    pub(crate) classpath: Vec<ClasspathEntry>,
    pub(crate) abi_target: Option<TargetIdentity>,
    pub(crate) output: Option<ArtifactRef>,
    pub(crate) jar: OnceCell<Arc<Jar>>,
    pub(crate) digest: OnceCell<String>,
}

impl JavaLibraryRule {
    pub fn args(&self) -> &JavaLibraryArgs {
        &self.args
    }

    pub fn provided_deps(&self) -> &RuleSet {
        &self.provided_deps
    }

    /// The jars this library compiles against, in target order.
    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    pub fn maven_coords(&self) -> Option<&str> {
        self.args.maven_coords.as_deref()
    }

    /// The compiled jar. Compiles on first use.
    ///
    /// # Errors
    /// Returns an error if this library or a classpath dependency fails to
    /// compile.
    pub fn jar(&self) -> Result<Arc<Jar>, JvmError> {
        self.jar
            .get_or_try_init(|| {
                if self.output.is_none() {
                    return Ok(Arc::new(Jar::new()));
                }
                let classpath = classpath_jars(&self.classpath_rules)?;
                let mut jar = self
                    .compiler
                    .compile(&self.target, &self.args.srcs, &classpath)?;
                for (path, contents) in &self.args.resources {
                    jar.resources
                        .insert(path.clone(), sha256_bytes(contents.as_bytes()));
                }
                jar.manifest.clone_from(&self.args.manifest_file);
                debug!(
                    target = %self.target,
                    classpath = classpath.len(),
                    "compiled library"
                );
                Ok(Arc::new(jar))
            })
            .map(Arc::clone)
    }
}

impl BuildRule for JavaLibraryRule {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn rule_type(&self) -> &'static str {
        JAVA_LIBRARY_KIND
    }

    fn build_deps(&self) -> &RuleSet {
        &self.build_deps
    }

    fn declared_deps(&self) -> &RuleSet {
        &self.declared_deps
    }

    fn output(&self) -> Option<&ArtifactRef> {
        self.output.as_ref()
    }

    fn exported_deps(&self) -> Option<&RuleSet> {
        Some(&self.exported_deps)
    }

    fn abi_target(&self) -> Option<&TargetIdentity> {
        self.abi_target.as_ref()
    }

    fn input_digest(&self) -> Result<String, EngineError> {
        let abi = self
            .abi_target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        Ok(sha256_multi(&[
            JAVA_LIBRARY_KIND,
            &self.args.inputs_digest()?,
            &abi,
        ]))
    }

    fn output_digest(&self) -> Result<String, EngineError> {
        self.digest
            .get_or_try_init(|| {
                let jar = self.jar().map_err(|e| e.into_build(&self.target))?;
                Ok(jar.digest()?)
            })
            .cloned()
    }
}

/// The jar a rule produces, if it is a JVM rule.
///
/// # Errors
/// Returns an error if producing the jar fails.
pub fn jar_of(rule: &RuleRef) -> Result<Option<Arc<Jar>>, JvmError> {
    if let Some(library) = downcast_rule::<JavaLibraryRule>(rule) {
        return library.jar().map(Some);
    }
    if let Some(abi) = downcast_rule::<CalculateAbiFromClasses>(rule) {
        return abi.jar().map(Some);
    }
    if let Some(abi) = downcast_rule::<CalculateAbiFromSource>(rule) {
        return abi.jar().map(Some);
    }
    if let Some(abi) = downcast_rule::<CompareAbis>(rule) {
        return abi.jar().map(Some);
    }
    Ok(None)
}

/// Jars of every JVM rule in `rules`; other rules contribute nothing.
pub(crate) fn classpath_jars(rules: &RuleSet) -> Result<Vec<Arc<Jar>>, JvmError> {
    rules
        .iter()
        .filter_map(|rule| jar_of(rule).transpose())
        .collect()
}

/// Classpath entries for every rule with an output.
pub(crate) fn classpath_entries(rules: &RuleSet) -> Vec<ClasspathEntry> {
    rules
        .iter()
        .filter_map(|rule| {
            rule.output().map(|artifact| ClasspathEntry {
                dependency: library_target(rule.target()),
                artifact: artifact.clone(),
            })
        })
        .collect()
}
