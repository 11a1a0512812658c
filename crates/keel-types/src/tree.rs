//! Syntax trees for JVM declarations.
//!
//! Trees live in a [`TreeArena`] and are addressed by [`TreeId`]. Every node
//! records its parent, so code holding a tree id can walk outwards to the
//! enclosing method, class, and compilation unit.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::TypeResolveError;

/// Index of a tree in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TreeId(usize);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

impl Visibility {
    /// Whether the declaration is part of the ABI.
    pub fn is_visible(self) -> bool {
        self != Self::Private
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Package => "",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
    Void,
}

impl PrimitiveKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "boolean" => Self::Boolean,
            "byte" => Self::Byte,
            "short" => Self::Short,
            "int" => Self::Int,
            "long" => Self::Long,
            "char" => Self::Char,
            "float" => Self::Float,
            "double" => Self::Double,
            "void" => Self::Void,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Annotation => "@interface",
        }
    }
}

/// Direction of a bounded wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WildcardBound {
    Extends,
    Super,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDecl {
    pub name: String,
    pub kind: ClassKind,
    pub visibility: Visibility,
    pub type_parameters: Vec<TreeId>,
    pub superclass: Option<TreeId>,
    pub interfaces: Vec<TreeId>,
    pub members: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDecl {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub type_parameters: Vec<TreeId>,
    /// `None` for constructors.
    pub return_type: Option<TreeId>,
    /// Parameter declarations; each is a variable tree.
    pub parameters: Vec<TreeId>,
    pub thrown: Vec<TreeId>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDecl {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub ty: TreeId,
    pub initializer: Option<String>,
}

/// The closed set of tree shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TreeKind {
    ArrayType {
        component: TreeId,
    },
    Wildcard {
        bound: Option<(WildcardBound, TreeId)>,
    },
    ParameterizedType {
        raw: TreeId,
        arguments: Vec<TreeId>,
    },
    MemberSelect {
        expression: TreeId,
        name: String,
    },
    Identifier {
        name: String,
    },
    Class(ClassDecl),
    Method(MethodDecl),
    Variable(VariableDecl),
    TypeParameter {
        name: String,
        bounds: Vec<TreeId>,
    },
    PrimitiveType(PrimitiveKind),
}

impl TreeKind {
    /// A short name for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ArrayType { .. } => "array type",
            Self::Wildcard { .. } => "wildcard",
            Self::ParameterizedType { .. } => "parameterized type",
            Self::MemberSelect { .. } => "member select",
            Self::Identifier { .. } => "identifier",
            Self::Class(_) => "class declaration",
            Self::Method(_) => "method declaration",
            Self::Variable(_) => "variable declaration",
            Self::TypeParameter { .. } => "type parameter",
            Self::PrimitiveType(_) => "primitive type",
        }
    }

    /// Direct children, in source order.
    pub fn children(&self) -> Vec<TreeId> {
        match self {
            Self::ArrayType { component } => vec![*component],
            Self::Wildcard { bound } => bound.iter().map(|(_, id)| *id).collect(),
            Self::ParameterizedType { raw, arguments } => {
                std::iter::once(*raw).chain(arguments.iter().copied()).collect()
            }
            Self::MemberSelect { expression, .. } => vec![*expression],
            Self::Class(class) => class
                .type_parameters
                .iter()
                .copied()
                .chain(class.superclass)
                .chain(class.interfaces.iter().copied())
                .chain(class.members.iter().copied())
                .collect(),
            Self::Method(method) => method
                .type_parameters
                .iter()
                .copied()
                .chain(method.return_type)
                .chain(method.parameters.iter().copied())
                .chain(method.thrown.iter().copied())
                .collect(),
            Self::Variable(variable) => vec![variable.ty],
            Self::TypeParameter { bounds, .. } => bounds.clone(),
            Self::Identifier { .. } | Self::PrimitiveType(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    kind: TreeKind,
    parent: Option<TreeId>,
}

impl TreeNode {
    pub fn kind(&self) -> &TreeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<TreeId> {
        self.parent
    }
}

/// Flat storage for trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeArena {
    nodes: Vec<TreeNode>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a tree and adopt its children.
    ///
    /// # Errors
    /// Returns an error if a child id is unknown or already has a parent.
    pub fn alloc(&mut self, kind: TreeKind) -> Result<TreeId, TypeResolveError> {
        let id = TreeId(self.nodes.len());
        let children = kind.children();
        for child in &children {
            let node = self
                .nodes
                .get(child.0)
                .ok_or(TypeResolveError::UnknownTree { tree: *child })?;
            if node.parent.is_some() {
                return Err(TypeResolveError::Unsupported {
                    what: format!("tree {child} shared between two parents"),
                });
            }
        }
        for child in children {
            if let Some(node) = self.nodes.get_mut(child.0) {
                node.parent = Some(id);
            }
        }
        self.nodes.push(TreeNode { kind, parent: None });
        Ok(id)
    }

    pub fn get(&self, id: TreeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    /// The kind of `id`.
    ///
    /// # Errors
    /// Returns an error if `id` is not in this arena.
    pub fn kind(&self, id: TreeId) -> Result<&TreeKind, TypeResolveError> {
        self.get(id)
            .map(TreeNode::kind)
            .ok_or(TypeResolveError::UnknownTree { tree: id })
    }

    pub fn parent(&self, id: TreeId) -> Option<TreeId> {
        self.get(id).and_then(TreeNode::parent)
    }

    /// `id` followed by each of its ancestors, innermost first.
    pub fn ancestors(&self, id: TreeId) -> impl Iterator<Item = TreeId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    /// Whether `id` is `ancestor` or lies inside it.
    pub fn is_within(&self, id: TreeId, ancestor: TreeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Compilation units
// ---------------------------------------------------------------------------

/// One source file: a package, its imports, and its top-level classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationUnit {
    pub path: String,
    pub package: String,
    /// Single-type (`a.b.C`) and on-demand (`a.b.*`) imports.
    pub imports: Vec<String>,
    pub classes: Vec<TreeId>,
}

/// The sources of one library target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSet {
    arena: TreeArena,
    units: Vec<CompilationUnit>,
    #[serde(skip)]
    unit_of_class: HashMap<TreeId, usize>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &TreeArena {
        &self.arena
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Add a source file built from class specs.
    ///
    /// # Errors
    /// Returns an error if a type expression in the specs cannot be parsed.
    pub fn add_unit(
        &mut self,
        path: &str,
        package: &str,
        imports: &[&str],
        classes: Vec<ClassSpec>,
    ) -> Result<&mut Self, TypeResolveError> {
        let index = self.units.len();
        let mut roots = Vec::new();
        for class in classes {
            let id = class.lower(&mut self.arena)?;
            self.unit_of_class.insert(id, index);
            roots.push(id);
        }
        self.units.push(CompilationUnit {
            path: path.to_owned(),
            package: package.to_owned(),
            imports: imports.iter().map(|s| (*s).to_owned()).collect(),
            classes: roots,
        });
        Ok(self)
    }

    /// The compilation unit containing `tree`.
    pub fn unit_of(&self, tree: TreeId) -> Option<&CompilationUnit> {
        let root = self.arena.ancestors(tree).last()?;
        let index = self.unit_of_class.get(&root)?;
        self.units.get(*index)
    }

    /// Every class declaration, outer classes before their members, paired
    /// with its qualified name.
    pub fn classes(&self) -> Vec<(TreeId, String)> {
        let mut found = Vec::new();
        for unit in &self.units {
            for root in &unit.classes {
                self.collect_classes(*root, &unit.package, &mut found);
            }
        }
        found
    }

    fn collect_classes(&self, id: TreeId, prefix: &str, found: &mut Vec<(TreeId, String)>) {
        let Ok(TreeKind::Class(class)) = self.arena.kind(id) else {
            return;
        };
        let qualified = qualify(prefix, &class.name);
        found.push((id, qualified.clone()));
        for member in &class.members {
            self.collect_classes(*member, &qualified, found);
        }
    }
}

/// Join a package or outer class name with a simple name.
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

// ---------------------------------------------------------------------------
// Declaration specs
// ---------------------------------------------------------------------------

/// Describes a class declaration; lowered into trees by
/// [`SourceSet::add_unit`].
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    kind: ClassKind,
    visibility: Visibility,
    type_parameters: Vec<TypeParamSpec>,
    superclass: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    classes: Vec<ClassSpec>,
}

#[derive(Debug, Clone)]
struct TypeParamSpec {
    name: String,
    bounds: Vec<String>,
}

impl ClassSpec {
    pub fn new(kind: ClassKind, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            visibility: Visibility::Package,
            type_parameters: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn class(name: &str) -> Self {
        Self::new(ClassKind::Class, name)
    }

    pub fn interface(name: &str) -> Self {
        Self::new(ClassKind::Interface, name)
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn public(self) -> Self {
        self.visibility(Visibility::Public)
    }

    pub fn type_param(mut self, name: &str, bounds: &[&str]) -> Self {
        self.type_parameters.push(TypeParamSpec {
            name: name.to_owned(),
            bounds: bounds.iter().map(|b| (*b).to_owned()).collect(),
        });
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_owned());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_owned());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn nested(mut self, class: ClassSpec) -> Self {
        self.classes.push(class);
        self
    }

    fn lower(self, arena: &mut TreeArena) -> Result<TreeId, TypeResolveError> {
        let type_parameters = lower_type_params(arena, &self.type_parameters)?;
        let superclass = self
            .superclass
            .as_deref()
            .map(|text| arena.parse_type(text))
            .transpose()?;
        let interfaces = parse_all(arena, &self.interfaces)?;

        let mut members = Vec::new();
        for field in self.fields {
            members.push(field.lower(arena)?);
        }
        for method in self.methods {
            members.push(method.lower(arena)?);
        }
        for class in self.classes {
            members.push(class.lower(arena)?);
        }

        arena.alloc(TreeKind::Class(ClassDecl {
            name: self.name,
            kind: self.kind,
            visibility: self.visibility,
            type_parameters,
            superclass,
            interfaces,
            members,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    ty: String,
    visibility: Visibility,
    is_static: bool,
    initializer: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_owned(),
            ty: ty.to_owned(),
            visibility: Visibility::Package,
            is_static: false,
            initializer: None,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn public(self) -> Self {
        self.visibility(Visibility::Public)
    }

    pub fn private(self) -> Self {
        self.visibility(Visibility::Private)
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn initializer(mut self, text: &str) -> Self {
        self.initializer = Some(text.to_owned());
        self
    }

    fn lower(self, arena: &mut TreeArena) -> Result<TreeId, TypeResolveError> {
        let ty = arena.parse_type(&self.ty)?;
        arena.alloc(TreeKind::Variable(VariableDecl {
            name: self.name,
            visibility: self.visibility,
            is_static: self.is_static,
            ty,
            initializer: self.initializer,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    name: String,
    visibility: Visibility,
    is_static: bool,
    type_parameters: Vec<TypeParamSpec>,
    return_type: Option<String>,
    parameters: Vec<(String, String)>,
    thrown: Vec<String>,
    body: Option<String>,
}

impl MethodSpec {
    /// A method returning `void` until [`returns`](Self::returns) says otherwise.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            visibility: Visibility::Package,
            is_static: false,
            type_parameters: Vec::new(),
            return_type: Some("void".to_owned()),
            parameters: Vec::new(),
            thrown: Vec::new(),
            body: None,
        }
    }

    pub fn constructor() -> Self {
        Self {
            return_type: None,
            ..Self::new("<init>")
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn public(self) -> Self {
        self.visibility(Visibility::Public)
    }

    pub fn private(self) -> Self {
        self.visibility(Visibility::Private)
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn type_param(mut self, name: &str, bounds: &[&str]) -> Self {
        self.type_parameters.push(TypeParamSpec {
            name: name.to_owned(),
            bounds: bounds.iter().map(|b| (*b).to_owned()).collect(),
        });
        self
    }

    pub fn returns(mut self, ty: &str) -> Self {
        self.return_type = Some(ty.to_owned());
        self
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.parameters.push((name.to_owned(), ty.to_owned()));
        self
    }

    pub fn throws(mut self, ty: &str) -> Self {
        self.thrown.push(ty.to_owned());
        self
    }

    pub fn body(mut self, text: &str) -> Self {
        self.body = Some(text.to_owned());
        self
    }

    fn lower(self, arena: &mut TreeArena) -> Result<TreeId, TypeResolveError> {
        let type_parameters = lower_type_params(arena, &self.type_parameters)?;
        let return_type = self
            .return_type
            .as_deref()
            .map(|text| arena.parse_type(text))
            .transpose()?;
        let mut parameters = Vec::new();
        for (name, ty) in self.parameters {
            let ty = arena.parse_type(&ty)?;
            parameters.push(arena.alloc(TreeKind::Variable(VariableDecl {
                name,
                visibility: Visibility::Package,
                is_static: false,
                ty,
                initializer: None,
            }))?);
        }
        let thrown = parse_all(arena, &self.thrown)?;

        arena.alloc(TreeKind::Method(MethodDecl {
            name: self.name,
            visibility: self.visibility,
            is_static: self.is_static,
            type_parameters,
            return_type,
            parameters,
            thrown,
            body: self.body,
        }))
    }
}

fn lower_type_params(
    arena: &mut TreeArena,
    specs: &[TypeParamSpec],
) -> Result<Vec<TreeId>, TypeResolveError> {
    specs
        .iter()
        .map(|spec| {
            let bounds = parse_all(arena, &spec.bounds)?;
            arena.alloc(TreeKind::TypeParameter {
                name: spec.name.clone(),
                bounds,
            })
        })
        .collect()
}

fn parse_all(arena: &mut TreeArena, texts: &[String]) -> Result<Vec<TreeId>, TypeResolveError> {
    texts.iter().map(|text| arena.parse_type(text)).collect()
}
