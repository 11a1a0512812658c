//! Lowering of class declarations into jar entries.
//!
//! Both the compiler and the source ABI generator go through here, so a class
//! compiled from trees and the same class derived from source render their
//! signatures identically. They differ only in where types come from.

use std::collections::BTreeMap;
use std::sync::Arc;

use keel_target::TargetIdentity;
use keel_types::{
    ClassKind, MethodDecl, SourceSet, TreeId, TreeKind, TypeMirror, TypeRef, TypeResolveError,
    Visibility,
};
use keel_util::hash::sha256_bytes;

use crate::error::JvmError;
use crate::jar::{ClassEntry, MemberEntry};

/// Settings for lowering the classes of one target.
pub(crate) struct Lowering<'a> {
    pub target: &'a TargetIdentity,
    pub sources: &'a SourceSet,
    /// Superclass of a class that declares none.
    pub object: TypeRef,
    pub none: TypeRef,
    /// Skip private declarations and bodies.
    pub abi_only: bool,
}

impl Lowering<'_> {
    fn resolve_error(&self, source: TypeResolveError) -> JvmError {
        JvmError::TypeResolve {
            target: self.target.clone(),
            source,
        }
    }

    /// Lower one class declaration. Nested classes are not included; they are
    /// lowered on their own. Returns `None` for a class hidden from the ABI.
    pub fn lower_class<F>(
        &self,
        class_tree: TreeId,
        qualified: &str,
        mut type_of: F,
    ) -> Result<Option<ClassEntry>, JvmError>
    where
        F: FnMut(TreeId) -> Result<TypeRef, JvmError>,
    {
        let arena = self.sources.arena();
        let TreeKind::Class(class) = arena.kind(class_tree).map_err(|e| self.resolve_error(e))?
        else {
            return Err(self.resolve_error(TypeResolveError::Unsupported {
                what: format!("{class_tree} is not a class declaration"),
            }));
        };
        if self.abi_only && self.hidden(class_tree) {
            return Ok(None);
        }

        let package = self
            .sources
            .unit_of(class_tree)
            .map(|unit| unit.package.clone())
            .unwrap_or_default();
        let name = qualified
            .strip_prefix(&format!("{package}."))
            .unwrap_or(qualified)
            .to_owned();

        let type_parameters = class
            .type_parameters
            .iter()
            .map(|tp| type_of(*tp).map(|ty| type_parameter(&ty)))
            .collect::<Result<Vec<_>, _>>()?;

        let superclass = match class.superclass {
            Some(tree) => type_of(tree)?,
            None if class.kind == ClassKind::Class => Arc::clone(&self.object),
            None => Arc::clone(&self.none),
        };
        let interfaces = class
            .interfaces
            .iter()
            .map(|tree| type_of(*tree).map(|ty| ty.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut clauses = Vec::new();
        if !matches!(superclass.as_ref(), TypeMirror::None) {
            clauses.push(format!("extends {superclass}"));
        }
        if !interfaces.is_empty() {
            let keyword = if class.kind == ClassKind::Interface {
                "extends"
            } else {
                "implements"
            };
            clauses.push(format!("{keyword} {}", interfaces.join(", ")));
        }

        let mut members = BTreeMap::new();
        for member in &class.members {
            let kind = arena.kind(*member).map_err(|e| self.resolve_error(e))?;
            let (visibility, body) = match kind {
                TreeKind::Method(method) => (method.visibility, method.body.as_deref()),
                TreeKind::Variable(field) => (field.visibility, field.initializer.as_deref()),
                _ => continue,
            };
            if self.abi_only && !visibility.is_visible() {
                continue;
            }
            let ty = type_of(*member)?;
            let key = match kind {
                TreeKind::Method(method) => self.method_key(method, &ty)?,
                TreeKind::Variable(field) => {
                    let prefix = if field.is_static { "static " } else { "" };
                    format!("{prefix}field {}: {ty}", field.name)
                }
                _ => continue,
            };
            let body_digest = if self.abi_only {
                None
            } else {
                body.map(|text| sha256_bytes(text.as_bytes()))
            };
            members.insert(
                key,
                MemberEntry {
                    visibility,
                    body_digest,
                },
            );
        }

        Ok(Some(ClassEntry {
            package,
            name,
            kind: class.kind,
            visibility: class.visibility,
            type_parameters,
            supertypes: clauses.join(" "),
            members,
        }))
    }

    /// Whether the class or any class enclosing it is private.
    fn hidden(&self, class_tree: TreeId) -> bool {
        let arena = self.sources.arena();
        arena.ancestors(class_tree).any(|id| {
            matches!(
                arena.kind(id),
                Ok(TreeKind::Class(class)) if class.visibility == Visibility::Private
            )
        })
    }

    /// `static method <R> convert(java.lang.String): R throws java.io.IOException`
    fn method_key(&self, method: &MethodDecl, ty: &TypeMirror) -> Result<String, JvmError> {
        let TypeMirror::Executable {
            type_parameters,
            return_type,
            parameters,
            thrown,
        } = ty
        else {
            return Err(self.resolve_error(TypeResolveError::Unsupported {
                what: format!("{} as the type of method `{}`", ty.label(), method.name),
            }));
        };

        let mut key = String::new();
        if method.is_static {
            key.push_str("static ");
        }
        let is_constructor = method.return_type.is_none();
        key.push_str(if is_constructor { "constructor " } else { "method " });
        if !type_parameters.is_empty() {
            let decls: Vec<String> = type_parameters.iter().map(|tp| type_parameter(tp)).collect();
            key.push('<');
            key.push_str(&decls.join(", "));
            key.push_str("> ");
        }
        key.push_str(&method.name);
        key.push('(');
        key.push_str(&join(parameters, ", "));
        key.push(')');
        if !is_constructor {
            key.push_str(": ");
            key.push_str(&return_type.to_string());
        }
        if !thrown.is_empty() {
            key.push_str(" throws ");
            key.push_str(&join(thrown, ", "));
        }
        Ok(key)
    }
}

fn join(types: &[TypeRef], separator: &str) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// A type parameter as declared: `T` or `T extends A & B`.
fn type_parameter(ty: &TypeMirror) -> String {
    match ty {
        TypeMirror::TypeVar { bounds, .. } if !bounds.is_empty() => {
            format!("{ty} extends {}", join(bounds, " & "))
        }
        other => other.to_string(),
    }
}

/// The first unresolved name inside `ty`, if any.
pub(crate) fn unresolved(ty: &TypeMirror) -> Option<&str> {
    match ty {
        TypeMirror::Error { name } => Some(name),
        TypeMirror::Array(component) => unresolved(component),
        TypeMirror::Declared {
            arguments,
            enclosing,
            ..
        } => enclosing
            .iter()
            .chain(arguments)
            .find_map(|t| unresolved(t)),
        TypeMirror::TypeVar { bounds, .. } => bounds.iter().find_map(|t| unresolved(t)),
        TypeMirror::Wildcard {
            extends,
            super_bound,
        } => extends.iter().chain(super_bound).find_map(|t| unresolved(t)),
        TypeMirror::Executable {
            type_parameters,
            return_type,
            parameters,
            thrown,
        } => type_parameters
            .iter()
            .chain(std::iter::once(return_type))
            .chain(parameters)
            .chain(thrown)
            .find_map(|t| unresolved(t)),
        TypeMirror::Union(types) | TypeMirror::Intersection(types) => {
            types.iter().find_map(|t| unresolved(t))
        }
        TypeMirror::Primitive(_) | TypeMirror::None | TypeMirror::Null | TypeMirror::Package(_) => {
            None
        }
    }
}
