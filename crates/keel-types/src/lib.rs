//! Syntax trees, elements, and standalone type resolution for source ABIs.

pub mod element;
pub mod error;
pub mod frontend;
pub mod mirror;
mod parse;
pub mod resolver;
pub mod tree;

pub use element::{ClasspathClass, Element, ElementKind, ElementOrigin, ElementRef, Elements};
pub use error::TypeResolveError;
pub use frontend::{SourceFrontEnd, Trees};
pub use mirror::{TypeMirror, TypeRef};
pub use resolver::TypeResolver;
pub use tree::{
    qualify, ClassDecl, ClassKind, ClassSpec, CompilationUnit, FieldSpec, MethodDecl, MethodSpec,
    PrimitiveKind, SourceSet, TreeArena, TreeId, TreeKind, VariableDecl, Visibility, WildcardBound,
};
