//! Lowering of `java_library` nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_config::JavaConfig;
use keel_engine::{EngineError, RuleRef, RuleResolver, RuleTransformer, TargetNode};
use keel_target::Flavor;

use crate::compiler::{ClassCompiler, TreeCompiler};
use crate::flavor::{is_library_target, AbiFlavor};
use crate::planner::LibraryPlan;

/// Builds library rules and, for flavored targets, their ABI rules.
#[derive(Debug, Clone)]
pub struct JavaLibraryTransformer {
    config: JavaConfig,
    compiler: Arc<dyn ClassCompiler>,
}

impl JavaLibraryTransformer {
    pub fn new(config: JavaConfig) -> Self {
        Self {
            config,
            compiler: Arc::new(TreeCompiler),
        }
    }

    /// Compile with `compiler` instead of the [`TreeCompiler`].
    pub fn with_compiler(mut self, compiler: Arc<dyn ClassCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn config(&self) -> &JavaConfig {
        &self.config
    }
}

impl RuleTransformer for JavaLibraryTransformer {
    fn transform(
        &self,
        node: &TargetNode,
        resolver: &RuleResolver,
    ) -> Result<RuleRef, EngineError> {
        let target = node.target();
        let plan = LibraryPlan::new(node, &self.config, resolver, &self.compiler)?;
        let rule = if is_library_target(target) {
            plan.build_library()
        } else {
            plan.build_abi(target)
        };
        rule.map_err(|e| e.into_construction(target))
    }

    /// Exactly one ABI flavor.
    fn supports_flavors(&self, flavors: &BTreeSet<Flavor>) -> bool {
        flavors.len() == 1
            && flavors
                .iter()
                .all(|f| AbiFlavor::ALL.iter().any(|abi| abi.flavor() == f))
    }
}
