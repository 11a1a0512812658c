//! Opaque prebuilt artifacts.
//!
//! A prebuilt target publishes fixed contents. It has no ABI, so consumers
//! always see its full output.

use std::sync::Arc;

use keel_target::TargetIdentity;
use keel_util::hash::{sha256_bytes, sha256_multi};

use crate::error::EngineError;
use crate::graph::{DependencyKind, TargetNode};
use crate::resolver::RuleResolver;
use crate::rule::{ArtifactRef, BuildRule, RuleRef, RuleSet};
use crate::transformer::RuleTransformer;

/// Target kind handled by [`PrebuiltTransformer`].
pub const PREBUILT_KIND: &str = "prebuilt";

/// Arguments of a prebuilt target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuiltArgs {
    pub contents: String,
}

impl PrebuiltArgs {
    pub fn new(contents: &str) -> Self {
        Self {
            contents: contents.to_owned(),
        }
    }
}

#[derive(Debug)]
pub struct PrebuiltRule {
    target: TargetIdentity,
    contents_digest: String,
    build_deps: RuleSet,
    exported_deps: RuleSet,
    output: ArtifactRef,
}

impl PrebuiltRule {
    pub fn new(
        target: TargetIdentity,
        contents: &str,
        build_deps: RuleSet,
        exported_deps: RuleSet,
    ) -> Self {
        let output = ArtifactRef::generated(&target, target.name());
        Self {
            target,
            contents_digest: sha256_bytes(contents.as_bytes()),
            build_deps,
            exported_deps,
            output,
        }
    }
}

impl BuildRule for PrebuiltRule {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }

    fn rule_type(&self) -> &'static str {
        PREBUILT_KIND
    }

    fn build_deps(&self) -> &RuleSet {
        &self.build_deps
    }

    fn output(&self) -> Option<&ArtifactRef> {
        Some(&self.output)
    }

    fn exported_deps(&self) -> Option<&RuleSet> {
        Some(&self.exported_deps)
    }

    fn input_digest(&self) -> Result<String, EngineError> {
        Ok(sha256_multi(&[PREBUILT_KIND, &self.contents_digest]))
    }

    fn output_digest(&self) -> Result<String, EngineError> {
        Ok(self.contents_digest.clone())
    }
}

/// Lowers `prebuilt` nodes. Declared and exported deps become build deps;
/// exported deps are also re-exported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrebuiltTransformer;

impl RuleTransformer for PrebuiltTransformer {
    fn transform(
        &self,
        node: &TargetNode,
        resolver: &RuleResolver,
    ) -> Result<RuleRef, EngineError> {
        let args = node.require_args::<PrebuiltArgs>()?;
        let declared = resolver.rule_set(node.deps(DependencyKind::Declared))?;
        let exported = resolver.rule_set(node.deps(DependencyKind::Exported))?;
        Ok(Arc::new(PrebuiltRule::new(
            node.target().clone(),
            &args.contents,
            declared.union(&exported),
            exported,
        )))
    }
}
