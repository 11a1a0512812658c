//! The compiler front end's view of a source set.
//!
//! [`Trees`] is the seam between type resolution and whatever compiler
//! classifies trees. [`SourceFrontEnd`] is the implementation used for source
//! ABIs: it resolves names through the usual scopes but models source
//! declarations with its own elements, so anything naming a source declaration
//! must be canonicalized before it can be compared.

use std::sync::Arc;

use crate::element::{ClasspathClass, ElementRef, ElementTable};
use crate::error::TypeResolveError;
use crate::mirror::{TypeMirror, TypeRef};
use crate::tree::{qualify, PrimitiveKind, SourceSet, TreeArena, TreeId, TreeKind, WildcardBound};

/// Tree classification by a compiler front end.
pub trait Trees {
    fn arena(&self) -> &TreeArena;

    /// The front end's own type for `tree`, or `None` if it has none.
    fn type_mirror(&self, tree: TreeId) -> Option<TypeRef>;

    /// The element `tree` declares or names.
    fn element(&self, tree: TreeId) -> Option<ElementRef>;
}

enum Named {
    Class(ElementRef),
    TypeParameter(TreeId, ElementRef),
    Package(ElementRef),
}

/// Name resolution over one source set and its classpath.
#[derive(Debug)]
pub struct SourceFrontEnd<'a> {
    sources: &'a SourceSet,
    table: ElementTable,
}

impl<'a> SourceFrontEnd<'a> {
    /// # Errors
    /// Returns an error if two source files declare the same class.
    pub fn new(
        sources: &'a SourceSet,
        classpath: &[ClasspathClass],
    ) -> Result<Self, TypeResolveError> {
        Ok(Self {
            sources,
            table: ElementTable::build(sources, classpath)?,
        })
    }

    pub fn sources(&self) -> &'a SourceSet {
        self.sources
    }

    /// Resolve a simple name as seen from `tree`: type parameters and member
    /// classes of enclosing declarations, then single-type imports, the
    /// current package, on-demand imports, `java.lang`, and finally packages.
    fn lookup(&self, tree: TreeId, name: &str) -> Option<Named> {
        let arena = self.sources.arena();
        for ancestor in arena.ancestors(tree) {
            match arena.kind(ancestor).ok()? {
                TreeKind::Method(method) => {
                    if let Some(found) = self.type_parameter(&method.type_parameters, name) {
                        return Some(found);
                    }
                }
                TreeKind::Class(class) => {
                    if let Some(found) = self.type_parameter(&class.type_parameters, name) {
                        return Some(found);
                    }
                    let own = self.table.tree(ancestor)?;
                    if let Some(member) = self.table.class(&qualify(own.qualified_name(), name)) {
                        return Some(Named::Class(Arc::clone(member)));
                    }
                    if class.name == name {
                        return Some(Named::Class(Arc::clone(own)));
                    }
                }
                _ => {}
            }
        }

        let class = |qualified: &str| self.table.class(qualified).map(|e| Named::Class(Arc::clone(e)));
        if let Some(unit) = self.sources.unit_of(tree) {
            let single = unit
                .imports
                .iter()
                .filter(|import| !import.ends_with(".*"))
                .find(|import| import.rsplit('.').next() == Some(name))
                .and_then(|import| class(import));
            if single.is_some() {
                return single;
            }
            if let Some(found) = class(&qualify(&unit.package, name)) {
                return Some(found);
            }
            let on_demand = unit
                .imports
                .iter()
                .filter_map(|import| import.strip_suffix(".*"))
                .find_map(|prefix| class(&qualify(prefix, name)));
            if on_demand.is_some() {
                return on_demand;
            }
        }
        class(&qualify("java.lang", name)).or_else(|| {
            self.table
                .package(name)
                .map(|p| Named::Package(Arc::clone(p)))
        })
    }

    fn type_parameter(&self, params: &[TreeId], name: &str) -> Option<Named> {
        let arena = self.sources.arena();
        params.iter().find_map(|id| match arena.kind(*id) {
            Ok(TreeKind::TypeParameter { name: declared, .. }) if declared == name => self
                .table
                .tree(*id)
                .map(|element| Named::TypeParameter(*id, Arc::clone(element))),
            _ => None,
        })
    }

    fn type_var(
        &self,
        id: TreeId,
        element: ElementRef,
        declaring: &mut Vec<TreeId>,
    ) -> Option<TypeRef> {
        if declaring.contains(&id) {
            return Some(Arc::new(TypeMirror::TypeVar {
                element,
                bounds: Vec::new(),
            }));
        }
        let TreeKind::TypeParameter { bounds, .. } = self.sources.arena().kind(id).ok()? else {
            return None;
        };
        declaring.push(id);
        let bounds: Option<Vec<TypeRef>> = bounds.iter().map(|b| self.classify(*b, declaring)).collect();
        declaring.pop();
        Some(Arc::new(TypeMirror::TypeVar {
            element,
            bounds: bounds?,
        }))
    }

    fn named_type(&self, named: Named, declaring: &mut Vec<TreeId>) -> Option<TypeRef> {
        match named {
            // A class named in a type reference is raw until arguments are applied.
            Named::Class(element) => Some(TypeMirror::declared(element, Vec::new(), None)),
            Named::Package(element) => TypeMirror::of_element(&element),
            Named::TypeParameter(id, element) => self.type_var(id, element, declaring),
        }
    }

    fn classify(&self, tree: TreeId, declaring: &mut Vec<TreeId>) -> Option<TypeRef> {
        let error = |name: String| Some(Arc::new(TypeMirror::Error { name }));
        match self.sources.arena().kind(tree).ok()? {
            TreeKind::PrimitiveType(kind) => Some(Arc::new(TypeMirror::Primitive(*kind))),
            TreeKind::ArrayType { component } => {
                Some(TypeMirror::array(self.classify(*component, declaring)?))
            }
            TreeKind::Wildcard { bound } => Some(match bound {
                None => TypeMirror::wildcard(None, None),
                Some((WildcardBound::Extends, b)) => {
                    TypeMirror::wildcard(Some(self.classify(*b, declaring)?), None)
                }
                Some((WildcardBound::Super, b)) => {
                    TypeMirror::wildcard(None, Some(self.classify(*b, declaring)?))
                }
            }),
            TreeKind::ParameterizedType { raw, arguments } => {
                let raw_type = self.classify(*raw, declaring)?;
                let TypeMirror::Declared {
                    element,
                    enclosing,
                    annotations,
                    ..
                } = raw_type.as_ref()
                else {
                    return Some(raw_type);
                };
                let arguments: Option<Vec<TypeRef>> =
                    arguments.iter().map(|a| self.classify(*a, declaring)).collect();
                Some(Arc::new(TypeMirror::Declared {
                    element: Arc::clone(element),
                    arguments: arguments?,
                    enclosing: enclosing.clone(),
                    annotations: annotations.clone(),
                }))
            }
            TreeKind::Identifier { name } => match self.lookup(tree, name) {
                Some(named) => self.named_type(named, declaring),
                None => error(name.clone()),
            },
            TreeKind::MemberSelect { expression, name } => {
                let outer = self.classify(*expression, declaring)?;
                match outer.as_ref() {
                    TypeMirror::Package(package) => {
                        let qualified = qualify(package.qualified_name(), name);
                        if let Some(class) = self.table.class(&qualified) {
                            Some(TypeMirror::declared(Arc::clone(class), Vec::new(), None))
                        } else if let Some(package) = self.table.package(&qualified) {
                            TypeMirror::of_element(package)
                        } else {
                            error(qualified)
                        }
                    }
                    TypeMirror::Declared {
                        element, arguments, ..
                    } => {
                        let qualified = qualify(element.qualified_name(), name);
                        let Some(member) = self.table.class(&qualified) else {
                            return error(qualified);
                        };
                        let enclosing = (!arguments.is_empty()).then(|| Arc::clone(&outer));
                        Some(TypeMirror::declared(Arc::clone(member), Vec::new(), enclosing))
                    }
                    _ => error(format!("{outer}.{name}")),
                }
            }
            TreeKind::Class(_) => TypeMirror::of_element(self.table.tree(tree)?),
            TreeKind::Method(method) => {
                let mut classify_all = |trees: &[TreeId]| -> Option<Vec<TypeRef>> {
                    trees.iter().map(|t| self.classify(*t, declaring)).collect()
                };
                let type_parameters = classify_all(&method.type_parameters)?;
                let parameters = classify_all(&method.parameters)?;
                let thrown = classify_all(&method.thrown)?;
                let return_type = match method.return_type {
                    Some(ty) => self.classify(ty, declaring)?,
                    None => Arc::new(TypeMirror::Primitive(PrimitiveKind::Void)),
                };
                Some(Arc::new(TypeMirror::Executable {
                    type_parameters,
                    return_type,
                    parameters,
                    thrown,
                }))
            }
            TreeKind::Variable(variable) => self.classify(variable.ty, declaring),
            TreeKind::TypeParameter { .. } => {
                let element = Arc::clone(self.table.tree(tree)?);
                self.type_var(tree, element, declaring)
            }
        }
    }
}

impl Trees for SourceFrontEnd<'_> {
    fn arena(&self) -> &TreeArena {
        self.sources.arena()
    }

    fn type_mirror(&self, tree: TreeId) -> Option<TypeRef> {
        self.classify(tree, &mut Vec::new())
    }

    fn element(&self, tree: TreeId) -> Option<ElementRef> {
        match self.sources.arena().kind(tree).ok()? {
            TreeKind::Class(_)
            | TreeKind::Method(_)
            | TreeKind::Variable(_)
            | TreeKind::TypeParameter { .. } => self.table.tree(tree).map(Arc::clone),
            TreeKind::Identifier { .. }
            | TreeKind::MemberSelect { .. }
            | TreeKind::ParameterizedType { .. } => {
                self.type_mirror(tree)?.element().map(Arc::clone)
            }
            TreeKind::ArrayType { .. } | TreeKind::Wildcard { .. } | TreeKind::PrimitiveType(_) => {
                None
            }
        }
    }
}
