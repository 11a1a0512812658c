//! Program elements: packages, classes, members and type parameters.
//!
//! Two tables of elements exist for one source set. The front end keeps its
//! own, in which source declarations are only partially modelled; [`Elements`]
//! holds the canonical ones. [`Elements::canonical_element`] maps any element
//! onto its canonical counterpart.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::TypeResolveError;
use crate::tree::{qualify, ClassKind, SourceSet, TreeArena, TreeId, TreeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Package,
    Class(ClassKind),
    TypeParameter,
    Method,
    Constructor,
    Field,
    Parameter,
}

impl ElementKind {
    pub fn is_class(self) -> bool {
        matches!(self, Self::Class(_))
    }
}

/// Where an element was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementOrigin {
    /// Declared by a syntax tree of the sources being compiled.
    Tree(TreeId),
    /// A package that at least one compilation unit declares.
    Sources,
    /// Known only from compiled classes.
    Classpath,
}

#[derive(Debug)]
pub struct Element {
    kind: ElementKind,
    simple_name: String,
    qualified_name: String,
    origin: ElementOrigin,
    type_parameters: Vec<ElementRef>,
}

pub type ElementRef = Arc<Element>;

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    /// Dotted name for packages and classes; `Owner#member` for members and
    /// type parameters.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn origin(&self) -> ElementOrigin {
        self.origin
    }

    pub fn tree(&self) -> Option<TreeId> {
        match self.origin {
            ElementOrigin::Tree(id) => Some(id),
            ElementOrigin::Sources | ElementOrigin::Classpath => None,
        }
    }

    /// Type parameters of a class, in declaration order.
    pub fn type_parameters(&self) -> &[ElementRef] {
        &self.type_parameters
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.qualified_name == other.qualified_name
            && self.origin == other.origin
    }
}

impl Eq for Element {}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

/// A class known from the classpath rather than from source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathClass {
    pub package: String,
    /// Simple name, or `Outer.Inner` for a nested class.
    pub name: String,
    pub kind: ClassKind,
    pub type_parameters: Vec<String>,
}

impl ClasspathClass {
    pub fn new(package: &str, name: &str, kind: ClassKind) -> Self {
        Self {
            package: package.to_owned(),
            name: name.to_owned(),
            kind,
            type_parameters: Vec::new(),
        }
    }

    pub fn with_type_parameters(mut self, names: &[&str]) -> Self {
        self.type_parameters = names.iter().map(|n| (*n).to_owned()).collect();
        self
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// The platform classes every compilation can see.
    pub fn platform() -> Vec<Self> {
        use ClassKind::{Class, Interface};
        vec![
            Self::new("java.lang", "Object", Class),
            Self::new("java.lang", "String", Class),
            Self::new("java.lang", "Number", Class),
            Self::new("java.lang", "Integer", Class),
            Self::new("java.lang", "Long", Class),
            Self::new("java.lang", "Boolean", Class),
            Self::new("java.lang", "Exception", Class),
            Self::new("java.lang", "RuntimeException", Class),
            Self::new("java.lang", "Runnable", Interface),
            Self::new("java.lang", "Comparable", Interface).with_type_parameters(&["T"]),
            Self::new("java.lang", "Iterable", Interface).with_type_parameters(&["T"]),
            Self::new("java.lang", "Enum", Class).with_type_parameters(&["E"]),
            Self::new("java.lang", "Class", Class).with_type_parameters(&["T"]),
            Self::new("java.io", "IOException", Class),
            Self::new("java.util", "Collection", Interface).with_type_parameters(&["E"]),
            Self::new("java.util", "List", Interface).with_type_parameters(&["E"]),
            Self::new("java.util", "Set", Interface).with_type_parameters(&["E"]),
            Self::new("java.util", "Map", Interface).with_type_parameters(&["K", "V"]),
            Self::new("java.util", "Map.Entry", Interface).with_type_parameters(&["K", "V"]),
            Self::new("java.util", "Optional", Class).with_type_parameters(&["T"]),
        ]
    }
}

/// Elements indexed by qualified name and by declaring tree.
#[derive(Debug, Default)]
pub(crate) struct ElementTable {
    classes: HashMap<String, ElementRef>,
    packages: HashMap<String, ElementRef>,
    by_tree: HashMap<TreeId, ElementRef>,
}

impl ElementTable {
    /// Declare the platform classes, `classpath`, and every declaration in
    /// `sources`. A source class replaces a classpath class of the same name.
    pub(crate) fn build(
        sources: &SourceSet,
        classpath: &[ClasspathClass],
    ) -> Result<Self, TypeResolveError> {
        let mut table = Self::default();
        for class in ClasspathClass::platform().iter().chain(classpath) {
            table.declare_classpath_class(class);
        }

        let mut seen_in_sources = HashSet::new();
        for unit in sources.units() {
            table.declare_package(&unit.package, ElementOrigin::Sources);
        }
        for (id, qualified) in sources.classes() {
            if !seen_in_sources.insert(qualified.clone()) {
                return Err(TypeResolveError::DuplicateClass { name: qualified });
            }
            table.declare_source_class(sources.arena(), id, &qualified)?;
        }
        Ok(table)
    }

    fn declare_package(&mut self, name: &str, origin: ElementOrigin) {
        let mut prefix = String::new();
        for segment in name.split('.').filter(|s| !s.is_empty()) {
            prefix = qualify(&prefix, segment);
            // Only the full name is declared by sources; its parents are not.
            let declared = if prefix == name {
                origin
            } else {
                ElementOrigin::Classpath
            };
            let replace = self.packages.get(&prefix).map_or(true, |existing| {
                declared == ElementOrigin::Sources && existing.origin != declared
            });
            if replace {
                self.packages.insert(
                    prefix.clone(),
                    Arc::new(Element {
                        kind: ElementKind::Package,
                        simple_name: segment.to_owned(),
                        qualified_name: prefix.clone(),
                        origin: declared,
                        type_parameters: Vec::new(),
                    }),
                );
            }
        }
    }

    fn declare_classpath_class(&mut self, class: &ClasspathClass) {
        let qualified = class.qualified_name();
        if self.classes.contains_key(&qualified) {
            return;
        }
        self.declare_package(&class.package, ElementOrigin::Classpath);
        let simple = class.name.rsplit('.').next().unwrap_or(&class.name);
        let type_parameters = class
            .type_parameters
            .iter()
            .map(|name| {
                Arc::new(Element {
                    kind: ElementKind::TypeParameter,
                    simple_name: name.clone(),
                    qualified_name: format!("{qualified}#{name}"),
                    origin: ElementOrigin::Classpath,
                    type_parameters: Vec::new(),
                })
            })
            .collect();
        self.classes.insert(
            qualified.clone(),
            Arc::new(Element {
                kind: ElementKind::Class(class.kind),
                simple_name: simple.to_owned(),
                qualified_name: qualified,
                origin: ElementOrigin::Classpath,
                type_parameters,
            }),
        );
    }

    fn declare_source_class(
        &mut self,
        arena: &TreeArena,
        id: TreeId,
        qualified: &str,
    ) -> Result<(), TypeResolveError> {
        let TreeKind::Class(class) = arena.kind(id)? else {
            return Err(TypeResolveError::Unsupported {
                what: format!("class element for non-class tree {id}"),
            });
        };

        let type_parameters = self.declare_type_parameters(arena, &class.type_parameters, qualified)?;
        let element = Arc::new(Element {
            kind: ElementKind::Class(class.kind),
            simple_name: class.name.clone(),
            qualified_name: qualified.to_owned(),
            origin: ElementOrigin::Tree(id),
            type_parameters,
        });
        self.classes.insert(qualified.to_owned(), Arc::clone(&element));
        self.by_tree.insert(id, element);

        for member in &class.members {
            match arena.kind(*member)? {
                TreeKind::Method(method) => {
                    let kind = if method.return_type.is_none() {
                        ElementKind::Constructor
                    } else {
                        ElementKind::Method
                    };
                    let owner = format!("{qualified}#{}", method.name);
                    let type_parameters =
                        self.declare_type_parameters(arena, &method.type_parameters, &owner)?;
                    self.by_tree.insert(
                        *member,
                        Arc::new(Element {
                            kind,
                            simple_name: method.name.clone(),
                            qualified_name: owner.clone(),
                            origin: ElementOrigin::Tree(*member),
                            type_parameters,
                        }),
                    );
                    for parameter in &method.parameters {
                        if let TreeKind::Variable(variable) = arena.kind(*parameter)? {
                            self.declare_member(
                                *parameter,
                                ElementKind::Parameter,
                                &variable.name,
                                &owner,
                            );
                        }
                    }
                }
                TreeKind::Variable(variable) => {
                    self.declare_member(*member, ElementKind::Field, &variable.name, qualified);
                }
                // Nested classes are declared on their own.
                _ => {}
            }
        }
        Ok(())
    }

    fn declare_type_parameters(
        &mut self,
        arena: &TreeArena,
        trees: &[TreeId],
        owner: &str,
    ) -> Result<Vec<ElementRef>, TypeResolveError> {
        let mut declared = Vec::new();
        for id in trees {
            let TreeKind::TypeParameter { name, .. } = arena.kind(*id)? else {
                continue;
            };
            let element = self.declare_member(*id, ElementKind::TypeParameter, name, owner);
            declared.push(element);
        }
        Ok(declared)
    }

    fn declare_member(
        &mut self,
        id: TreeId,
        kind: ElementKind,
        name: &str,
        owner: &str,
    ) -> ElementRef {
        let element = Arc::new(Element {
            kind,
            simple_name: name.to_owned(),
            qualified_name: format!("{owner}#{name}"),
            origin: ElementOrigin::Tree(id),
            type_parameters: Vec::new(),
        });
        self.by_tree.insert(id, Arc::clone(&element));
        element
    }

    pub(crate) fn class(&self, qualified_name: &str) -> Option<&ElementRef> {
        self.classes.get(qualified_name)
    }

    pub(crate) fn package(&self, name: &str) -> Option<&ElementRef> {
        self.packages.get(name)
    }

    pub(crate) fn tree(&self, id: TreeId) -> Option<&ElementRef> {
        self.by_tree.get(&id)
    }
}

/// The canonical elements of one source set and its classpath.
#[derive(Debug)]
pub struct Elements {
    table: ElementTable,
}

impl Elements {
    /// # Errors
    /// Returns an error if two source files declare the same class.
    pub fn new(sources: &SourceSet, classpath: &[ClasspathClass]) -> Result<Self, TypeResolveError> {
        Ok(Self {
            table: ElementTable::build(sources, classpath)?,
        })
    }

    pub fn type_element(&self, qualified_name: &str) -> Option<&ElementRef> {
        self.table.class(qualified_name)
    }

    pub fn package_element(&self, name: &str) -> Option<&ElementRef> {
        self.table.package(name)
    }

    /// The element declared by a class, method, variable or type parameter tree.
    pub fn tree_element(&self, id: TreeId) -> Option<&ElementRef> {
        self.table.tree(id)
    }

    /// Map an element from any table onto the canonical one.
    pub fn canonical_element(&self, element: &ElementRef) -> Option<ElementRef> {
        let found = match element.kind {
            ElementKind::Package => self.table.package(&element.qualified_name),
            ElementKind::Class(_) => self.table.class(&element.qualified_name),
            _ => match element.origin {
                ElementOrigin::Tree(id) => self.table.tree(id),
                ElementOrigin::Sources | ElementOrigin::Classpath => {
                    return Some(Arc::clone(element))
                }
            },
        };
        found.map(Arc::clone)
    }

    /// Whether the canonical form of `element` comes from the sources being
    /// compiled.
    pub fn is_tree_backed(&self, element: &ElementRef) -> bool {
        self.canonical_element(element)
            .is_some_and(|canonical| canonical.origin != ElementOrigin::Classpath)
    }
}
