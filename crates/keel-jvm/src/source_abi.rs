//! Deriving a library's ABI straight from its syntax trees.

use std::sync::Arc;

use tracing::debug;

use keel_target::TargetIdentity;
use keel_types::{Elements, SourceFrontEnd, SourceSet, TypeResolveError, TypeResolver};

use crate::compiler::classpath_classes;
use crate::error::JvmError;
use crate::jar::Jar;
use crate::lower::Lowering;

/// Build the ABI of `sources` without compiling them.
///
/// Each class declaration gets its own [`TypeResolver`], so references to
/// sibling declarations are canonicalized and cached per declaration.
///
/// # Errors
/// Returns [`JvmError::TypeResolve`] if a type reference cannot be resolved
/// or has an unsupported shape.
pub fn generate_source_abi(
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

    let mut jar = Jar::new();
    for (class_tree, qualified) in sources.classes() {
        let mut resolver = TypeResolver::new(&elements, &front_end, class_tree);
        let lowering = Lowering {
            target,
            sources,
            object: resolver.java_lang_object().map_err(resolve_error)?,
            none: resolver.none_type(),
            abi_only: true,
        };
        let class = lowering.lower_class(class_tree, &qualified, |tree| {
            resolver.resolve_type(tree).map_err(resolve_error)
        })?;
        if let Some(class) = class {
            jar.insert_class(class);
        }
    }
    debug!(target = %target, classes = jar.classes.len(), "generated source abi");
    Ok(jar)
}
