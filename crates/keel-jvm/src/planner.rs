//! Compile-avoidance planning for one library node.
//!
//! A plan answers, for one library, how its ABI jar is produced and what its
//! compile-time classpath is. Every answer is computed at most once and
//! cached in the plan; a plan lives for one transformation.

use std::sync::Arc;

use once_cell::unsync::OnceCell;
use tracing::debug;

use keel_config::{AbiVerificationMode, JavaConfig};
use keel_engine::{
    exported_rules, ArtifactRef, DependencyKind, EngineError, RuleRef, RuleResolver, RuleSet,
    TargetNode,
};
use keel_target::TargetIdentity;

use crate::abi::{CalculateAbiFromClasses, CalculateAbiFromSource, CompareAbis};
use crate::args::JavaLibraryArgs;
use crate::compiler::ClassCompiler;
use crate::error::JvmError;
use crate::flavor::{
    class_abi_jar, library_target, source_abi_jar, verified_source_abi_jar, AbiFlavor,
};
use crate::library::{classpath_entries, JavaLibraryRule};

pub struct LibraryPlan<'a> {
    library: TargetIdentity,
    node: &'a TargetNode,
    args: Arc<JavaLibraryArgs>,
    config: &'a JavaConfig,
    resolver: &'a RuleResolver,
    compiler: &'a Arc<dyn ClassCompiler>,
    abi_flavor: OnceCell<Option<AbiFlavor>>,
    declared_deps: OnceCell<RuleSet>,
    exported_deps: OnceCell<RuleSet>,
    provided_deps: OnceCell<RuleSet>,
    extra_deps: OnceCell<RuleSet>,
    full_classpath_deps: OnceCell<RuleSet>,
    classpath_deps: OnceCell<RuleSet>,
    final_declared_deps: OnceCell<RuleSet>,
}

impl<'a> LibraryPlan<'a> {
    /// Plan the library behind `node`, which may be the library itself or
    /// one of its ABI targets.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgs`] if the node is not a library.
    pub fn new(
        node: &'a TargetNode,
        config: &'a JavaConfig,
        resolver: &'a RuleResolver,
        compiler: &'a Arc<dyn ClassCompiler>,
    ) -> Result<Self, EngineError> {
        let args = node.require_args::<JavaLibraryArgs>()?.clone();
        Ok(Self {
            library: library_target(node.target()),
            node,
            args: Arc::new(args),
            config,
            resolver,
            compiler,
            abi_flavor: OnceCell::new(),
            declared_deps: OnceCell::new(),
            exported_deps: OnceCell::new(),
            provided_deps: OnceCell::new(),
            extra_deps: OnceCell::new(),
            full_classpath_deps: OnceCell::new(),
            classpath_deps: OnceCell::new(),
            final_declared_deps: OnceCell::new(),
        })
    }

    pub fn library(&self) -> &TargetIdentity {
        &self.library
    }

    pub fn produces_output(&self) -> bool {
        self.args.produces_output()
    }

    /// Whether the ABI jar is derived from source, and if not, why.
    fn source_abi_blocker(&self) -> Option<&'static str> {
        if !self.config.generate_abis_from_source {
            Some("source abis are disabled")
        } else if self.args.generate_abi_from_source == Some(false) {
            Some("source abis are disabled for this target")
        } else if !self.config.supports_source_abi(self.args.language.as_str()) {
            Some("the toolchain cannot derive abis from this language")
        } else if self.args.srcs.is_empty() {
            Some("the target has no sources")
        } else if !self.args.postprocess_classes_commands.is_empty() {
            Some("classes are post-processed")
        } else {
            None
        }
    }

    /// How the ABI jar is produced; `None` for a library without a jar.
    pub fn abi_flavor(&self) -> Option<AbiFlavor> {
        *self.abi_flavor.get_or_init(|| {
            if !self.produces_output() {
                debug!(target = %self.library, "no output, no abi");
                return None;
            }
            let flavor = match self.source_abi_blocker() {
                Some(reason) => {
                    debug!(target = %self.library, reason, "using class abi");
                    AbiFlavor::Class
                }
                None if self.config.source_abi_verification_mode == AbiVerificationMode::Off => {
                    AbiFlavor::Source
                }
                None => AbiFlavor::VerifiedSource,
            };
            debug!(target = %self.library, abi = %flavor.flavor(), "selected abi");
            Some(flavor)
        })
    }

    /// The target dependents compile against in place of this library.
    pub fn abi_target(&self) -> Option<TargetIdentity> {
        self.abi_flavor().map(|flavor| match flavor {
            AbiFlavor::Class => class_abi_jar(&self.library),
            AbiFlavor::Source => source_abi_jar(&self.library),
            AbiFlavor::VerifiedSource => verified_source_abi_jar(&self.library),
        })
    }

    fn deps(&self, cell: &OnceCell<RuleSet>, kind: DependencyKind) -> Result<RuleSet, EngineError> {
        cell.get_or_try_init(|| self.resolver.rule_set(self.node.deps(kind)))
            .cloned()
    }

    pub fn declared_deps(&self) -> Result<RuleSet, EngineError> {
        self.deps(&self.declared_deps, DependencyKind::Declared)
    }

    pub fn exported_deps(&self) -> Result<RuleSet, EngineError> {
        self.deps(&self.exported_deps, DependencyKind::Exported)
    }

    pub fn provided_deps(&self) -> Result<RuleSet, EngineError> {
        self.deps(&self.provided_deps, DependencyKind::Provided)
    }

    pub fn extra_deps(&self) -> Result<RuleSet, EngineError> {
        self.deps(&self.extra_deps, DependencyKind::Extra)
    }

    /// Declared, exported and provided deps plus everything they re-export.
    pub fn full_classpath_deps(&self) -> Result<RuleSet, EngineError> {
        self.full_classpath_deps
            .get_or_try_init(|| {
                let first_order = self
                    .declared_deps()?
                    .union(&self.exported_deps()?)
                    .union(&self.provided_deps()?);
                let reexported = exported_rules(first_order.iter());
                Ok(first_order.union(&reexported))
            })
            .cloned()
    }

    /// The rules whose jars this library compiles against: ABI rules where
    /// the build compiles against ABIs and a dependency has one, full rules
    /// otherwise.
    pub fn classpath_deps(&self) -> Result<RuleSet, EngineError> {
        self.classpath_deps
            .get_or_try_init(|| {
                let full = self.full_classpath_deps()?;
                if !self.config.compile_against_abis {
                    return Ok(full);
                }
                for rule in &full {
                    if let Some(abi) = rule.abi_target() {
                        debug!(target = %self.library, dependency = %rule.target(), abi = %abi, "compiling against abi");
                    }
                }
                self.resolver.abi_rules_where_possible(full.iter())
            })
            .cloned()
    }

    /// Declared deps as recorded in build deps: substituted like the
    /// classpath when compiling against ABIs.
    pub fn final_declared_deps(&self) -> Result<RuleSet, EngineError> {
        self.final_declared_deps
            .get_or_try_init(|| {
                let declared = self.declared_deps()?;
                if self.config.compile_against_abis {
                    self.resolver.abi_rules_where_possible(declared.iter())
                } else {
                    Ok(declared)
                }
            })
            .cloned()
    }

    /// Everything that must be built before the library or its source ABI.
    fn compile_deps(&self) -> Result<RuleSet, EngineError> {
        Ok(self
            .final_declared_deps()?
            .union(&self.classpath_deps()?)
            .union(&self.extra_deps()?))
    }

    fn source_abi_rule(&self) -> Result<CalculateAbiFromSource, JvmError> {
        CalculateAbiFromSource::new(
            source_abi_jar(&self.library),
            Arc::clone(&self.args),
            self.compile_deps()?,
            self.classpath_deps()?,
        )
    }

    /// Build the library rule. A source ABI, when the library has one, is
    /// registered alongside it and built first.
    ///
    /// # Errors
    /// Returns an error if a dependency cannot be resolved.
    pub fn build_library(&self) -> Result<RuleRef, JvmError> {
        let mut build_deps = self.compile_deps()?;
        if matches!(
            self.abi_flavor(),
            Some(AbiFlavor::Source | AbiFlavor::VerifiedSource)
        ) {
            let source_abi = self
                .resolver
                .compute_if_absent(&source_abi_jar(&self.library), |target| {
                    let rule = self
                        .source_abi_rule()
                        .map_err(|e| e.into_construction(target))?;
                    Ok(Arc::new(rule) as RuleRef)
                })?;
            build_deps.insert(source_abi);
        }

        let classpath_rules = self.classpath_deps()?;
        let output = self.produces_output().then(|| {
            ArtifactRef::generated(&self.library, &format!("{}.jar", self.library.name()))
        });
        Ok(Arc::new(JavaLibraryRule {
            target: self.library.clone(),
            args: Arc::clone(&self.args),
            compiler: Arc::clone(self.compiler),
            declared_deps: self.declared_deps()?,
            exported_deps: self.exported_deps()?,
            provided_deps: self.provided_deps()?,
            build_deps,
            classpath: classpath_entries(&classpath_rules),
            classpath_rules,
            abi_target: self.abi_target(),
            output,
            jar: once_cell::sync::OnceCell::new(),
            digest: once_cell::sync::OnceCell::new(),
        }))
    }

    /// Build the rule for one of the library's ABI targets.
    ///
    /// # Errors
    /// Returns [`JvmError::NotAnAbiTarget`] if `target` does not carry exactly
    /// one ABI flavor or the library cannot have that kind of ABI.
    pub fn build_abi(&self, target: &TargetIdentity) -> Result<RuleRef, JvmError> {
        let flavor = AbiFlavor::of(target)?;
        if !self.produces_output() {
            return Err(JvmError::NotAnAbiTarget {
                target: target.clone(),
                reason: "the library produces no jar",
            });
        }
        if flavor != AbiFlavor::Class && self.args.srcs.is_empty() {
            return Err(JvmError::NotAnAbiTarget {
                target: target.clone(),
                reason: "the library has no sources to derive an abi from",
            });
        }
        match flavor {
            AbiFlavor::Class => {
                let library = self
                    .resolver
                    .require_rule_with_type::<JavaLibraryRule>(&self.library)?;
                Ok(Arc::new(CalculateAbiFromClasses::new(target.clone(), library)?))
            }
            AbiFlavor::Source => Ok(Arc::new(self.source_abi_rule()?)),
            AbiFlavor::VerifiedSource => {
                let class_abi = self
                    .resolver
                    .require_rule_with_type::<CalculateAbiFromClasses>(&class_abi_jar(&self.library))?;
                let source_abi = self
                    .resolver
                    .require_rule_with_type::<CalculateAbiFromSource>(&source_abi_jar(&self.library))?;
                Ok(Arc::new(CompareAbis::new(
                    target.clone(),
                    class_abi,
                    source_abi,
                    self.config.source_abi_verification_mode,
                )?))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::compiler::JvmLanguage;
    use crate::library::JAVA_LIBRARY_KIND;
    use crate::transformer::JavaLibraryTransformer;
    use keel_engine::{
        downcast_rule, BuildRule, PrebuiltArgs, PrebuiltTransformer, TargetGraph,
        TransformerRegistry, PREBUILT_KIND,
    };
    use keel_types::{ClassSpec, MethodSpec, SourceSet};

    fn t(text: &str) -> TargetIdentity {
        TargetIdentity::parse(text).unwrap()
    }

    fn config(against_abis: bool, from_source: bool, mode: AbiVerificationMode) -> JavaConfig {
        JavaConfig {
            compile_against_abis: against_abis,
            generate_abis_from_source: from_source,
            source_abi_verification_mode: mode,
            ..JavaConfig::default()
        }
    }

    fn srcs(package: &str, class: &str) -> SourceSet {
        let mut srcs = SourceSet::new();
        srcs.add_unit(
            &format!("{class}.java"),
            package,
            &[],
            vec![ClassSpec::class(class)
                .public()
                .method(MethodSpec::new("run").public().body("work();"))],
        )
        .unwrap();
        srcs
    }

    fn library(target: &str, args: JavaLibraryArgs) -> TargetNode {
        TargetNode::new(t(target), JAVA_LIBRARY_KIND, args)
    }

    fn simple(target: &str) -> TargetNode {
        let name = t(target).name().to_owned();
        library(target, JavaLibraryArgs::new(srcs("com.example", &name.to_uppercase())))
    }

    fn prebuilt(target: &str) -> TargetNode {
        TargetNode::new(t(target), PREBUILT_KIND, PrebuiltArgs::new(target))
    }

    fn resolver(config: JavaConfig, nodes: Vec<TargetNode>) -> RuleResolver {
        RuleResolver::new(
            TargetGraph::new(nodes).unwrap(),
            TransformerRegistry::new()
                .with(JAVA_LIBRARY_KIND, JavaLibraryTransformer::new(config))
                .with(PREBUILT_KIND, PrebuiltTransformer),
        )
    }

    fn abi_target_of(config: JavaConfig, node: TargetNode) -> Option<String> {
        let target = node.target().clone();
        let resolver = resolver(config, vec![node]);
        let rule = resolver.require_rule(&target).unwrap();
        rule.abi_target().map(ToString::to_string)
    }

    fn names<'a>(targets: impl Iterator<Item = &'a TargetIdentity>) -> Vec<String> {
        targets.map(ToString::to_string).collect()
    }

    #[test]
    fn abi_mode_selection() {
        let off = config(true, true, AbiVerificationMode::Off);
        assert_eq!(
            abi_target_of(off.clone(), simple("//a:a")).as_deref(),
            Some("//a:a#source-abi")
        );
        assert_eq!(
            abi_target_of(config(true, true, AbiVerificationMode::Warn), simple("//a:a")).as_deref(),
            Some("//a:a#verified-source-abi")
        );
        assert_eq!(
            abi_target_of(config(true, false, AbiVerificationMode::Off), simple("//a:a")).as_deref(),
            Some("//a:a#class-abi")
        );

        let class_abi_cases = [
            JavaLibraryArgs::new(srcs("com.example", "A")).language(JvmLanguage::Kotlin),
            JavaLibraryArgs::new(srcs("com.example", "A")).postprocess("strip-debug"),
            JavaLibraryArgs::new(srcs("com.example", "A")).abi_from_source(false),
            JavaLibraryArgs::default().resource("a.properties", "x=1"),
        ];
        for args in class_abi_cases {
            assert_eq!(
                abi_target_of(off.clone(), library("//a:a", args)).as_deref(),
                Some("//a:a#class-abi")
            );
        }

        assert_eq!(abi_target_of(off, library("//a:a", JavaLibraryArgs::default())), None);
    }

    #[test]
    fn classpath_substitutes_abis_where_possible() {
        let resolver = resolver(
            config(true, false, AbiVerificationMode::Off),
            vec![
                simple("//a:a")
                    .with_dep(DependencyKind::Declared, t("//b:b"))
                    .with_dep(DependencyKind::Declared, t("//p:p"))
                    .with_dep(DependencyKind::Extra, t("//gen:gen")),
                simple("//b:b").with_dep(DependencyKind::Exported, t("//x:x")),
                simple("//x:x"),
                prebuilt("//p:p"),
                prebuilt("//gen:gen"),
            ],
        );
        let a = resolver
            .require_rule_with_type::<JavaLibraryRule>(&t("//a:a"))
            .unwrap();

        let classpath: Vec<(String, String, bool)> = a
            .classpath()
            .iter()
            .map(|entry| {
                (
                    entry.dependency.to_string(),
                    entry.artifact.owner().to_string(),
                    entry.is_abi(),
                )
            })
            .collect();
        assert_eq!(
            classpath,
            vec![
                ("//b:b".to_owned(), "//b:b#class-abi".to_owned(), true),
                ("//p:p".to_owned(), "//p:p".to_owned(), false),
                ("//x:x".to_owned(), "//x:x#class-abi".to_owned(), true),
            ]
        );
        assert_eq!(names(a.declared_deps().targets()), vec!["//b:b", "//p:p"]);
        assert_eq!(
            names(a.build_deps().targets()),
            vec!["//b:b#class-abi", "//gen:gen", "//p:p", "//x:x#class-abi"]
        );
    }

    #[test]
    fn full_classpath_without_abis() {
        let resolver = resolver(
            config(false, false, AbiVerificationMode::Off),
            vec![
                simple("//a:a").with_dep(DependencyKind::Declared, t("//b:b")),
                simple("//b:b").with_dep(DependencyKind::Exported, t("//x:x")),
                simple("//x:x"),
            ],
        );
        let a = resolver
            .require_rule_with_type::<JavaLibraryRule>(&t("//a:a"))
            .unwrap();
        assert!(a.classpath().iter().all(|entry| !entry.is_abi()));
        assert_eq!(names(a.build_deps().targets()), vec!["//b:b", "//x:x"]);
        assert!(resolver.get_rule_optional(&t("//b:b#class-abi")).is_none());
    }

    #[test]
    fn provided_deps_are_compiled_against_but_recorded_apart() {
        let resolver = resolver(
            config(true, false, AbiVerificationMode::Off),
            vec![
                simple("//a:a").with_dep(DependencyKind::Provided, t("//api:api")),
                simple("//api:api"),
            ],
        );
        let a = resolver
            .require_rule_with_type::<JavaLibraryRule>(&t("//a:a"))
            .unwrap();
        assert!(a.declared_deps().is_empty());
        assert_eq!(names(a.provided_deps().targets()), vec!["//api:api"]);
        assert_eq!(names(a.build_deps().targets()), vec!["//api:api#class-abi"]);
    }

    #[test]
    fn source_abi_is_registered_with_the_library() {
        let resolver = resolver(
            config(true, true, AbiVerificationMode::Off),
            vec![simple("//foo:bar")],
        );
        let library = resolver.require_rule(&t("//foo:bar")).unwrap();
        let registered = resolver.get_rule_optional(&t("//foo:bar#source-abi")).unwrap();
        let in_deps = library.build_deps().get(&t("//foo:bar#source-abi")).unwrap();
        assert!(Arc::ptr_eq(&registered, in_deps));
        assert!(downcast_rule::<CalculateAbiFromSource>(&registered).is_some());
    }

    #[test]
    fn abi_of_library_without_output_is_rejected() {
        let resolver = resolver(
            config(true, false, AbiVerificationMode::Off),
            vec![library("//empty:empty", JavaLibraryArgs::default())],
        );
        let err = resolver
            .require_rule(&t("//empty:empty#class-abi"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("//empty:empty#class-abi"), "{err}");
        assert!(err.contains("not an ABI target"), "{err}");
    }

    #[test]
    fn only_abi_flavors_reach_the_transformer() {
        let resolver = resolver(
            config(true, false, AbiVerificationMode::Off),
            vec![
                simple("//foo:bar"),
                library(
                    "//foo:both#class-abi,source-abi",
                    JavaLibraryArgs::new(srcs("com.example", "Both")),
                ),
            ],
        );
        let err = resolver.require_rule(&t("//foo:bar#android")).unwrap_err();
        assert!(matches!(err, EngineError::NoTargetNode { .. }), "{err}");
        let err = resolver
            .require_rule(&t("//foo:bar#class-abi,source-abi"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NoTargetNode { .. }), "{err}");

        let err = resolver
            .require_rule(&t("//foo:both#class-abi,source-abi"))
            .unwrap_err();
        let EngineError::Construction { source, .. } = err else {
            panic!("expected a construction error, got {err}");
        };
        assert!(matches!(
            source.downcast_ref::<JvmError>(),
            Some(JvmError::NotAnAbiTarget { .. })
        ));
    }
}
