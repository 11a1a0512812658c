//! The class compiler collaborator.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use keel_target::TargetIdentity;
use keel_types::{ClasspathClass, Elements, SourceFrontEnd, SourceSet, Trees, TypeMirror, TypeResolveError};

use crate::error::JvmError;
use crate::jar::Jar;
use crate::lower::{unresolved, Lowering};

/// Source language of a library target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JvmLanguage {
    #[default]
    Java,
    Kotlin,
    Scala,
    Groovy,
}

impl JvmLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Groovy => "groovy",
        }
    }
}

impl fmt::Display for JvmLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiles one library's sources against a classpath.
pub trait ClassCompiler: Send + Sync + fmt::Debug {
    /// Produce the library's class files. Resources and the manifest are
    /// added by the caller.
    ///
    /// # Errors
    /// Returns [`JvmError::Compilation`] if the sources do not compile.
    fn compile(
        &self,
        target: &TargetIdentity,
        sources: &SourceSet,
        classpath: &[Arc<Jar>],
    ) -> Result<Jar, JvmError>;
}

/// Every class visible through a set of classpath jars.
pub fn classpath_classes(classpath: &[Arc<Jar>]) -> Vec<ClasspathClass> {
    classpath
        .iter()
        .flat_map(|jar| jar.classpath_classes())
        .collect()
}

/// A compiler that lowers declarations with the front end's own
/// classification. Every name must resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeCompiler;

impl ClassCompiler for TreeCompiler {
    fn compile(
        &self,
        target: &TargetIdentity,
        sources: &SourceSet,
        classpath: &[Arc<Jar>],
    ) -> Result<Jar, JvmError> {
        let resolve_error = |source: TypeResolveError| JvmError::TypeResolve {
            target: target.clone(),
            source,
        };
        let visible = classpath_classes(classpath);
        let elements = Elements::new(sources, &visible).map_err(resolve_error)?;
        let front_end = SourceFrontEnd::new(sources, &visible).map_err(resolve_error)?;
        let object = elements
            .type_element("java.lang.Object")
            .and_then(TypeMirror::of_element)
            .ok_or_else(|| {
                resolve_error(TypeResolveError::MissingElement {
                    name: "java.lang.Object".to_owned(),
                })
            })?;
        let lowering = Lowering {
            target,
            sources,
            object,
            none: Arc::new(TypeMirror::None),
            abi_only: false,
        };

        let mut jar = Jar::new();
        for (class_tree, qualified) in sources.classes() {
            let class = lowering.lower_class(class_tree, &qualified, |tree| {
                let ty = front_end
                    .type_mirror(tree)
                    .ok_or_else(|| JvmError::Compilation {
                        target: target.clone(),
                        message: format!("cannot classify {tree} in {qualified}"),
                    })?;
                if let Some(name) = unresolved(&ty) {
                    return Err(JvmError::Compilation {
                        target: target.clone(),
                        message: format!("cannot find symbol `{name}` in {qualified}"),
                    });
                }
                Ok(ty)
            })?;
            if let Some(class) = class {
                jar.insert_class(class);
            }
        }
        debug!(target = %target, classes = jar.classes.len(), "compiled classes");
        Ok(jar)
    }
}
