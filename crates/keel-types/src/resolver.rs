//! Type resolution for trees that name declarations still being compiled.
//!
//! The front end classifies every tree, but its view of source declarations
//! is partial. [`TypeResolver`] keeps the front end's answer whenever no part
//! of it names a source declaration, and otherwise rebuilds the type from the
//! tree with canonical elements.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::element::{ElementKind, ElementRef, Elements};
use crate::error::TypeResolveError;
use crate::frontend::Trees;
use crate::mirror::{TypeMirror, TypeRef};
use crate::tree::{PrimitiveKind, TreeId, TreeKind, WildcardBound};

/// Resolves the type trees of one declaration.
///
/// Results are cached per tree for the life of the resolver, so resolving the
/// same tree twice returns the same [`TypeRef`]. A resolver is not shared
/// between threads; each declaration gets its own.
pub struct TypeResolver<'a> {
    elements: &'a Elements,
    trees: &'a dyn Trees,
    declaration: TreeId,
    cache: HashMap<TreeId, TypeRef>,
    none: TypeRef,
}

impl<'a> TypeResolver<'a> {
    /// A resolver for the trees inside `declaration`.
    pub fn new(elements: &'a Elements, trees: &'a dyn Trees, declaration: TreeId) -> Self {
        Self {
            elements,
            trees,
            declaration,
            cache: HashMap::new(),
            none: Arc::new(TypeMirror::None),
        }
    }

    pub fn declaration(&self) -> TreeId {
        self.declaration
    }

    /// The type of `tree`.
    ///
    /// # Errors
    /// Returns [`TypeResolveError::Unsupported`] for error, union, intersection
    /// and executable types where a type reference is expected, and for
    /// parameterized types whose raw type does not resolve to a class. Also
    /// fails for trees outside the declaration.
    pub fn resolve_type(&mut self, tree: TreeId) -> Result<TypeRef, TypeResolveError> {
        if let Some(cached) = self.cache.get(&tree) {
            return Ok(Arc::clone(cached));
        }
        if !self.trees.arena().is_within(tree, self.declaration) {
            return Err(TypeResolveError::ForeignTree {
                tree,
                declaration: self.declaration,
            });
        }
        let resolved = self.resolve_uncached(tree)?;
        self.cache.insert(tree, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// The declared type of `java.lang.Object`.
    ///
    /// # Errors
    /// Returns an error if the classpath does not provide `java.lang.Object`.
    pub fn java_lang_object(&self) -> Result<TypeRef, TypeResolveError> {
        self.elements
            .type_element("java.lang.Object")
            .and_then(TypeMirror::of_element)
            .ok_or_else(|| TypeResolveError::MissingElement {
                name: "java.lang.Object".to_owned(),
            })
    }

    /// The `NONE` type. Every call returns the same instance.
    pub fn none_type(&self) -> TypeRef {
        Arc::clone(&self.none)
    }

    fn resolve_uncached(&mut self, tree: TreeId) -> Result<TypeRef, TypeResolveError> {
        let trees = self.trees;
        let kind = trees.arena().kind(tree)?;

        // The front end's type of a method is executable, which is never a
        // type reference; go straight to the element.
        if let TreeKind::Method(_) = kind {
            return self.canonical_element_type(tree);
        }

        let default = trees
            .type_mirror(tree)
            .ok_or(TypeResolveError::Unclassified { what: "type", tree })?;
        if !self.needs_standalone(&default)? {
            return Ok(default);
        }

        trace!(%tree, kind = kind.label(), "building standalone type");
        match kind {
            TreeKind::ArrayType { component } => Ok(TypeMirror::array(self.resolve_type(*component)?)),
            TreeKind::Wildcard { bound } => Ok(match bound {
                None => TypeMirror::wildcard(None, None),
                Some((WildcardBound::Extends, b)) => {
                    TypeMirror::wildcard(Some(self.resolve_type(*b)?), None)
                }
                Some((WildcardBound::Super, b)) => {
                    TypeMirror::wildcard(None, Some(self.resolve_type(*b)?))
                }
            }),
            TreeKind::PrimitiveType(_) => Ok(default),
            TreeKind::ParameterizedType { raw, arguments } => {
                let raw_type = self.resolve_type(*raw)?;
                let arguments = arguments
                    .iter()
                    .map(|a| self.resolve_type(*a))
                    .collect::<Result<Vec<_>, _>>()?;
                match raw_type.as_ref() {
                    // The raw type resolved but its arguments did not.
                    TypeMirror::Declared {
                        element,
                        enclosing,
                        annotations,
                        ..
                    } => Ok(Arc::new(TypeMirror::Declared {
                        element: Arc::clone(element),
                        arguments,
                        enclosing: enclosing.clone(),
                        annotations: annotations.clone(),
                    })),
                    other => Err(TypeResolveError::Unsupported {
                        what: format!("parameterized type with {} raw type", other.label()),
                    }),
                }
            }
            TreeKind::MemberSelect { expression, .. } => match default.as_ref() {
                TypeMirror::Package(_) => self.canonical_element_type(tree),
                TypeMirror::Declared { .. } => {
                    let containing = self.resolve_type(*expression)?;
                    let enclosing = match containing.as_ref() {
                        TypeMirror::Declared { arguments, .. } if !arguments.is_empty() => {
                            Some(Arc::clone(&containing))
                        }
                        _ => None,
                    };
                    let element = self.canonical_class(tree)?;
                    Ok(TypeMirror::declared(element, Vec::new(), enclosing))
                }
                other => Err(TypeResolveError::Unsupported {
                    what: format!("member select of {}", other.label()),
                }),
            },
            TreeKind::Identifier { .. } => match default.as_ref() {
                TypeMirror::Package(_) | TypeMirror::TypeVar { .. } => {
                    self.canonical_element_type(tree)
                }
                TypeMirror::Declared { .. } => {
                    Ok(TypeMirror::declared(self.canonical_class(tree)?, Vec::new(), None))
                }
                other => Err(TypeResolveError::Unsupported {
                    what: format!("identifier of {}", other.label()),
                }),
            },
            TreeKind::Class(_)
            | TreeKind::Method(_)
            | TreeKind::Variable(_)
            | TreeKind::TypeParameter { .. } => self.canonical_element_type(tree),
        }
    }

    /// Whether any part of `ty` names an element whose canonical form comes
    /// from source.
    fn needs_standalone(&self, ty: &TypeMirror) -> Result<bool, TypeResolveError> {
        match ty {
            TypeMirror::Array(component) => self.needs_standalone(component),
            TypeMirror::TypeVar { element, bounds } => {
                Ok(self.elements.is_tree_backed(element) || self.any_needs_standalone(bounds)?)
            }
            TypeMirror::Wildcard {
                extends,
                super_bound,
            } => Ok(self.any_needs_standalone(extends.iter())?
                || self.any_needs_standalone(super_bound.iter())?),
            TypeMirror::Package(_) => Ok(true),
            TypeMirror::Declared {
                element, arguments, ..
            } => Ok(self.elements.is_tree_backed(element) || self.any_needs_standalone(arguments)?),
            TypeMirror::Primitive(_) | TypeMirror::None | TypeMirror::Null => Ok(false),
            TypeMirror::Error { name } => Err(TypeResolveError::Unsupported {
                what: format!("error type `{name}`"),
            }),
            TypeMirror::Executable { .. } | TypeMirror::Union(_) | TypeMirror::Intersection(_) => {
                Err(TypeResolveError::Unsupported {
                    what: ty.label().to_owned(),
                })
            }
        }
    }

    fn any_needs_standalone<'t>(
        &self,
        types: impl IntoIterator<Item = &'t TypeRef>,
    ) -> Result<bool, TypeResolveError> {
        for ty in types {
            if self.needs_standalone(ty)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn canonical_element(&self, tree: TreeId) -> Result<ElementRef, TypeResolveError> {
        let element = self
            .trees
            .element(tree)
            .ok_or(TypeResolveError::Unclassified {
                what: "element",
                tree,
            })?;
        self.elements
            .canonical_element(&element)
            .ok_or_else(|| TypeResolveError::MissingElement {
                name: element.qualified_name().to_owned(),
            })
    }

    fn canonical_class(&self, tree: TreeId) -> Result<ElementRef, TypeResolveError> {
        let element = self.canonical_element(tree)?;
        if element.kind().is_class() {
            Ok(element)
        } else {
            Err(TypeResolveError::Unsupported {
                what: format!("class type naming {}", element.qualified_name()),
            })
        }
    }

    /// The type the canonical element of `tree` declares.
    fn canonical_element_type(&mut self, tree: TreeId) -> Result<TypeRef, TypeResolveError> {
        let element = self.canonical_element(tree)?;
        match element.kind() {
            ElementKind::Package | ElementKind::Class(_) => TypeMirror::of_element(&element)
                .ok_or_else(|| TypeResolveError::MissingElement {
                    name: element.qualified_name().to_owned(),
                }),
            ElementKind::TypeParameter => {
                // Bounds come from the front end: resolving them here would
                // recurse through the variable's own uses.
                let bounds = match element.tree() {
                    Some(id) => match self.trees.arena().kind(id)? {
                        TreeKind::TypeParameter { bounds, .. } => bounds
                            .iter()
                            .filter_map(|b| self.trees.type_mirror(*b))
                            .collect(),
                        _ => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Arc::new(TypeMirror::TypeVar { element, bounds }))
            }
            ElementKind::Method | ElementKind::Constructor => self.executable_type(&element),
            ElementKind::Field | ElementKind::Parameter => {
                let id = self.declaring_tree(&element)?;
                let trees = self.trees;
                match trees.arena().kind(id)? {
                    TreeKind::Variable(variable) => self.resolve_type(variable.ty),
                    other => Err(TypeResolveError::Unsupported {
                        what: format!("variable element declared by {}", other.label()),
                    }),
                }
            }
        }
    }

    fn executable_type(&mut self, element: &ElementRef) -> Result<TypeRef, TypeResolveError> {
        let id = self.declaring_tree(element)?;
        let trees = self.trees;
        let TreeKind::Method(method) = trees.arena().kind(id)? else {
            return Err(TypeResolveError::Unsupported {
                what: format!("method element {} without a method tree", element.qualified_name()),
            });
        };
        let mut resolve_all = |trees: &[TreeId]| -> Result<Vec<TypeRef>, TypeResolveError> {
            trees.iter().map(|t| self.resolve_type(*t)).collect()
        };
        let type_parameters = resolve_all(&method.type_parameters)?;
        let parameters = resolve_all(&method.parameters)?;
        let thrown = resolve_all(&method.thrown)?;
        let return_type = match method.return_type {
            Some(ty) => self.resolve_type(ty)?,
            None => Arc::new(TypeMirror::Primitive(PrimitiveKind::Void)),
        };
        Ok(Arc::new(TypeMirror::Executable {
            type_parameters,
            return_type,
            parameters,
            thrown,
        }))
    }

    fn declaring_tree(&self, element: &ElementRef) -> Result<TreeId, TypeResolveError> {
        element.tree().ok_or_else(|| TypeResolveError::Unsupported {
            what: format!("member {} without source", element.qualified_name()),
        })
    }
}
