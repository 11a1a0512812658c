//! Rules producing ABI jars.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use keel_config::AbiVerificationMode;
use keel_engine::{ArtifactRef, BuildRule, EngineError, RuleRef, RuleSet};
use keel_target::TargetIdentity;
use keel_util::hash::sha256_multi;

use crate::args::JavaLibraryArgs;
use crate::error::JvmError;
use crate::flavor::{library_target, AbiFlavor};
use crate::jar::{first_abi_difference, Jar};
use crate::library::{classpath_jars, JavaLibraryRule};
use crate::source_abi::generate_source_abi;

fn expect_flavor(target: &TargetIdentity, expected: AbiFlavor) -> Result<(), JvmError> {
    if AbiFlavor::of(target)? == expected {
        Ok(())
    } else {
        Err(JvmError::NotAnAbiTarget {
            target: target.clone(),
            reason: "its ABI flavor does not match the rule building it",
        })
    }
}

fn abi_artifact(target: &TargetIdentity) -> ArtifactRef {
    ArtifactRef::generated(target, &format!("{}-abi.jar", target.name()))
}

fn digest_of(target: &TargetIdentity, jar: Result<Arc<Jar>, JvmError>) -> Result<String, EngineError> {
    let jar = jar.map_err(|e| e.into_build(target))?;
    Ok(jar.digest()?)
}

// ---------------------------------------------------------------------------
// Class ABI
// ---------------------------------------------------------------------------

/// The ABI stripped from a compiled library jar.
#[derive(Debug)]
pub struct CalculateAbiFromClasses {
    target: TargetIdentity,
    library: Arc<JavaLibraryRule>,
    build_deps: RuleSet,
    output: ArtifactRef,
    jar: OnceCell<Arc<Jar>>,
    digest: OnceCell<String>,
}

impl CalculateAbiFromClasses {
    pub const RULE_TYPE: &'static str = "calculate_abi_from_classes";

    /// # Errors
    /// Returns [`JvmError::NotAnAbiTarget`] unless `target` is a class ABI
    /// target and the library produces a jar.
    pub fn new(target: TargetIdentity, library: Arc<JavaLibraryRule>) -> Result<Self, JvmError> {
        expect_flavor(&target, AbiFlavor::Class)?;
        if library.output().is_none() {
            return Err(JvmError::NotAnAbiTarget {
                target,
                reason: "the library produces no jar",
            });
        }
        let library_ref: RuleRef = library.clone();
        Ok(Self {
            output: abi_artifact(&target),
            target,
            library,
            build_deps: std::iter::once(library_ref).collect(),
            jar: OnceCell::new(),
            digest: OnceCell::new(),
        })
    }

    /// # Errors
    /// Returns an error if the library fails to compile.
    pub fn jar(&self) -> Result<Arc<Jar>, JvmError> {
        self.jar
            .get_or_try_init(|| Ok(Arc::new(self.library.jar()?.to_abi())))
            .map(Arc::clone)
    }
}

impl BuildRule for CalculateAbiFromClasses {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn rule_type(&self) -> &'static str {
        Self::RULE_TYPE
    }

    fn build_deps(&self) -> &RuleSet {
        &self.build_deps
    }

    fn output(&self) -> Option<&ArtifactRef> {
        Some(&self.output)
    }

    fn input_digest(&self) -> Result<String, EngineError> {
        Ok(sha256_multi(&[Self::RULE_TYPE]))
    }

    fn output_digest(&self) -> Result<String, EngineError> {
        self.digest
            .get_or_try_init(|| digest_of(&self.target, self.jar()))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Source ABI
// ---------------------------------------------------------------------------

/// The ABI derived from a library's sources, before (and without) compiling
/// them.
#[derive(Debug)]
pub struct CalculateAbiFromSource {
    target: TargetIdentity,
    args: Arc<JavaLibraryArgs>,
    build_deps: RuleSet,
    classpath_rules: RuleSet,
    output: ArtifactRef,
    jar: OnceCell<Arc<Jar>>,
    digest: OnceCell<String>,
}

impl CalculateAbiFromSource {
    pub const RULE_TYPE: &'static str = "calculate_abi_from_source";

    /// `classpath_rules` must be a subset of `build_deps`.
    ///
    /// # Errors
    /// Returns [`JvmError::NotAnAbiTarget`] unless `target` is a source ABI
    /// target.
    pub fn new(
        target: TargetIdentity,
        args: Arc<JavaLibraryArgs>,
        build_deps: RuleSet,
        classpath_rules: RuleSet,
    ) -> Result<Self, JvmError> {
        expect_flavor(&target, AbiFlavor::Source)?;
        Ok(Self {
            output: abi_artifact(&target),
            target,
            args,
            build_deps,
            classpath_rules,
            jar: OnceCell::new(),
            digest: OnceCell::new(),
        })
    }

    /// # Errors
    /// Returns an error if a type reference cannot be resolved.
    pub fn jar(&self) -> Result<Arc<Jar>, JvmError> {
        self.jar
            .get_or_try_init(|| {
                let classpath = classpath_jars(&self.classpath_rules)?;
                let jar = generate_source_abi(&self.target, &self.args.srcs, &classpath)?;
                Ok(Arc::new(jar))
            })
            .map(Arc::clone)
    }
}

impl BuildRule for CalculateAbiFromSource {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn rule_type(&self) -> &'static str {
        Self::RULE_TYPE
    }

    fn build_deps(&self) -> &RuleSet {
        &self.build_deps
    }

    fn output(&self) -> Option<&ArtifactRef> {
        Some(&self.output)
    }

    fn input_digest(&self) -> Result<String, EngineError> {
        Ok(sha256_multi(&[Self::RULE_TYPE, &self.args.inputs_digest()?]))
    }

    fn output_digest(&self) -> Result<String, EngineError> {
        self.digest
            .get_or_try_init(|| digest_of(&self.target, self.jar()))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Verified source ABI
// ---------------------------------------------------------------------------

/// A source ABI checked against the class ABI of the same library.
///
/// The comparison is structural over member signatures. Its outcome depends
/// on the verification mode: `error` fails the build, `warn` logs and
/// publishes the source ABI anyway, `off` skips the comparison.
#[derive(Debug)]
pub struct CompareAbis {
    target: TargetIdentity,
    class_abi: Arc<CalculateAbiFromClasses>,
    source_abi: Arc<CalculateAbiFromSource>,
    mode: AbiVerificationMode,
    build_deps: RuleSet,
    output: ArtifactRef,
    jar: OnceCell<Arc<Jar>>,
    digest: OnceCell<String>,
    mismatch: OnceCell<String>,
}

impl CompareAbis {
    pub const RULE_TYPE: &'static str = "compare_abis";

    /// # Errors
    /// Returns [`JvmError::NotAnAbiTarget`] unless `target` is a verified
    /// source ABI target.
    pub fn new(
        target: TargetIdentity,
        class_abi: Arc<CalculateAbiFromClasses>,
        source_abi: Arc<CalculateAbiFromSource>,
        mode: AbiVerificationMode,
    ) -> Result<Self, JvmError> {
        expect_flavor(&target, AbiFlavor::VerifiedSource)?;
        let class_ref: RuleRef = class_abi.clone();
        let source_ref: RuleRef = source_abi.clone();
        Ok(Self {
            output: abi_artifact(&target),
            target,
            class_abi,
            source_abi,
            mode,
            build_deps: [class_ref, source_ref].into_iter().collect(),
            jar: OnceCell::new(),
            digest: OnceCell::new(),
            mismatch: OnceCell::new(),
        })
    }

    pub fn mode(&self) -> AbiVerificationMode {
        self.mode
    }

    /// The first member at which the two ABIs differed, once a comparison
    /// has run and found one.
    pub fn mismatch(&self) -> Option<&str> {
        self.mismatch.get().map(String::as_str)
    }

    /// The verified source ABI.
    ///
    /// # Errors
    /// Returns [`JvmError::AbiMismatch`] in `error` mode when the two ABIs
    /// differ, or any error from producing either ABI.
    pub fn jar(&self) -> Result<Arc<Jar>, JvmError> {
        self.jar
            .get_or_try_init(|| {
                let source = self.source_abi.jar()?;
                if self.mode == AbiVerificationMode::Off {
                    return Ok(source);
                }
                let class = self.class_abi.jar()?;
                let Some(member) = first_abi_difference(&class, &source) else {
                    info!(target = %self.target, "source abi matches class abi");
                    return Ok(source);
                };
                self.mismatch.get_or_init(|| member.clone());
                let mismatch = JvmError::AbiMismatch {
                    target: library_target(&self.target),
                    member,
                };
                match self.mode {
                    AbiVerificationMode::Error => Err(mismatch),
                    AbiVerificationMode::Warn | AbiVerificationMode::Off => {
                        warn!(target = %self.target, "{mismatch}");
                        Ok(source)
                    }
                }
            })
            .map(Arc::clone)
    }
}

impl BuildRule for CompareAbis {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn rule_type(&self) -> &'static str {
        Self::RULE_TYPE
    }

    fn build_deps(&self) -> &RuleSet {
        &self.build_deps
    }

    fn output(&self) -> Option<&ArtifactRef> {
        Some(&self.output)
    }

    fn input_digest(&self) -> Result<String, EngineError> {
        Ok(sha256_multi(&[Self::RULE_TYPE, &self.mode.to_string()]))
    }

    fn output_digest(&self) -> Result<String, EngineError> {
        self.digest
            .get_or_try_init(|| digest_of(&self.target, self.jar()))
            .cloned()
    }
}
