//! Semantic types.

use std::fmt;
use std::sync::Arc;

use crate::element::{ElementKind, ElementRef};
use crate::tree::PrimitiveKind;

pub type TypeRef = Arc<TypeMirror>;

/// A type as the compiler sees it.
#[derive(Debug, Clone)]
pub enum TypeMirror {
    /// A primitive type or `void`.
    Primitive(PrimitiveKind),
    /// The absence of a type, such as the superclass of `java.lang.Object`.
    None,
    Null,
    Package(ElementRef),
    Declared {
        element: ElementRef,
        arguments: Vec<TypeRef>,
        /// Only set when the enclosing type is parameterized.
        enclosing: Option<TypeRef>,
        annotations: Vec<String>,
    },
    Array(TypeRef),
    TypeVar {
        element: ElementRef,
        /// Bounds as classified at the point of use. A reference to a type
        /// variable from within its own bounds carries no bounds.
        bounds: Vec<TypeRef>,
    },
    Wildcard {
        extends: Option<TypeRef>,
        super_bound: Option<TypeRef>,
    },
    Executable {
        type_parameters: Vec<TypeRef>,
        return_type: TypeRef,
        parameters: Vec<TypeRef>,
        thrown: Vec<TypeRef>,
    },
    /// A reference the compiler could not resolve.
    Error {
        name: String,
    },
    Union(Vec<TypeRef>),
    Intersection(Vec<TypeRef>),
}

impl TypeMirror {
    pub fn array(component: TypeRef) -> TypeRef {
        Arc::new(Self::Array(component))
    }

    pub fn declared(
        element: ElementRef,
        arguments: Vec<TypeRef>,
        enclosing: Option<TypeRef>,
    ) -> TypeRef {
        Arc::new(Self::Declared {
            element,
            arguments,
            enclosing,
            annotations: Vec::new(),
        })
    }

    pub fn wildcard(extends: Option<TypeRef>, super_bound: Option<TypeRef>) -> TypeRef {
        Arc::new(Self::Wildcard {
            extends,
            super_bound,
        })
    }

    /// The type an element declares: a package type, a class applied to its
    /// own type variables, or a type variable. Members have no type of their
    /// own without their trees.
    pub fn of_element(element: &ElementRef) -> Option<TypeRef> {
        match element.kind() {
            ElementKind::Package => Some(Arc::new(Self::Package(Arc::clone(element)))),
            ElementKind::Class(_) => {
                let arguments = element
                    .type_parameters()
                    .iter()
                    .map(|param| {
                        Arc::new(Self::TypeVar {
                            element: Arc::clone(param),
                            bounds: Vec::new(),
                        })
                    })
                    .collect();
                Some(Self::declared(Arc::clone(element), arguments, None))
            }
            ElementKind::TypeParameter => Some(Arc::new(Self::TypeVar {
                element: Arc::clone(element),
                bounds: Vec::new(),
            })),
            ElementKind::Method
            | ElementKind::Constructor
            | ElementKind::Field
            | ElementKind::Parameter => None,
        }
    }

    /// A short name for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primitive(PrimitiveKind::Void) => "void type",
            Self::Primitive(_) => "primitive type",
            Self::None => "none type",
            Self::Null => "null type",
            Self::Package(_) => "package type",
            Self::Declared { .. } => "declared type",
            Self::Array(_) => "array type",
            Self::TypeVar { .. } => "type variable",
            Self::Wildcard { .. } => "wildcard type",
            Self::Executable { .. } => "executable type",
            Self::Error { .. } => "error type",
            Self::Union(_) => "union type",
            Self::Intersection(_) => "intersection type",
        }
    }

    /// The element of a declared, package or type-variable type.
    pub fn element(&self) -> Option<&ElementRef> {
        match self {
            Self::Package(element)
            | Self::Declared { element, .. }
            | Self::TypeVar { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Type arguments of a declared type; empty for every other type.
    pub fn type_arguments(&self) -> &[TypeRef] {
        match self {
            Self::Declared { arguments, .. } => arguments,
            _ => &[],
        }
    }
}

/// Type variables compare by element, the way the compiler treats them.
impl PartialEq for TypeMirror {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Primitive(a), Self::Primitive(b)) => a == b,
            (Self::None, Self::None) | (Self::Null, Self::Null) => true,
            (Self::Package(a), Self::Package(b)) => a == b,
            (
                Self::Declared {
                    element: a,
                    arguments: a_args,
                    enclosing: a_enclosing,
                    annotations: a_annotations,
                },
                Self::Declared {
                    element: b,
                    arguments: b_args,
                    enclosing: b_enclosing,
                    annotations: b_annotations,
                },
            ) => a == b && a_args == b_args && a_enclosing == b_enclosing && a_annotations == b_annotations,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::TypeVar { element: a, .. }, Self::TypeVar { element: b, .. }) => a == b,
            (
                Self::Wildcard {
                    extends: a_extends,
                    super_bound: a_super,
                },
                Self::Wildcard {
                    extends: b_extends,
                    super_bound: b_super,
                },
            ) => a_extends == b_extends && a_super == b_super,
            (
                Self::Executable {
                    type_parameters: a_params,
                    return_type: a_return,
                    parameters: a_parameters,
                    thrown: a_thrown,
                },
                Self::Executable {
                    type_parameters: b_params,
                    return_type: b_return,
                    parameters: b_parameters,
                    thrown: b_thrown,
                },
            ) => {
                a_params == b_params
                    && a_return == b_return
                    && a_parameters == b_parameters
                    && a_thrown == b_thrown
            }
            (Self::Error { name: a }, Self::Error { name: b }) => a == b,
            (Self::Union(a), Self::Union(b)) | (Self::Intersection(a), Self::Intersection(b)) => {
                a == b
            }
            _ => false,
        }
    }
}

impl Eq for TypeMirror {}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[TypeRef], separator: &str) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

/// Renders source-level type syntax with fully qualified class names.
impl fmt::Display for TypeMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => f.write_str(kind.keyword()),
            Self::None => f.write_str("none"),
            Self::Null => f.write_str("null"),
            Self::Package(element) => f.write_str(element.qualified_name()),
            Self::Declared {
                element,
                arguments,
                enclosing,
                annotations,
            } => {
                for annotation in annotations {
                    write!(f, "@{annotation} ")?;
                }
                match enclosing {
                    Some(outer) => write!(f, "{outer}.{}", element.simple_name())?,
                    None => f.write_str(element.qualified_name())?,
                }
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    write_list(f, arguments, ", ")?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Array(component) => write!(f, "{component}[]"),
            Self::TypeVar { element, .. } => f.write_str(element.simple_name()),
            Self::Wildcard {
                extends,
                super_bound,
            } => match (extends, super_bound) {
                (Some(bound), _) => write!(f, "? extends {bound}"),
                (None, Some(bound)) => write!(f, "? super {bound}"),
                (None, None) => f.write_str("?"),
            },
            Self::Executable {
                type_parameters,
                return_type,
                parameters,
                thrown,
            } => {
                if !type_parameters.is_empty() {
                    f.write_str("<")?;
                    write_list(f, type_parameters, ", ")?;
                    f.write_str(">")?;
                }
                f.write_str("(")?;
                write_list(f, parameters, ", ")?;
                write!(f, ")")?;
                write!(f, "{return_type}")?;
                if !thrown.is_empty() {
                    f.write_str(" throws ")?;
                    write_list(f, thrown, ", ")?;
                }
                Ok(())
            }
            Self::Error { name } => f.write_str(name),
            Self::Union(alternatives) => write_list(f, alternatives, " | "),
            Self::Intersection(bounds) => write_list(f, bounds, " & "),
        }
    }
}
