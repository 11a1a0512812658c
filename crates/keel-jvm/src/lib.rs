//! JVM libraries for Keel: jars and their ABIs, the compile-avoidance
//! planner, and the `java_library` transformer.

pub mod abi;
pub mod args;
pub mod compiler;
pub mod error;
pub mod flavor;
pub mod jar;
pub mod library;
mod lower;
pub mod planner;
pub mod source_abi;
pub mod transformer;

pub use abi::{CalculateAbiFromClasses, CalculateAbiFromSource, CompareAbis};
pub use args::JavaLibraryArgs;
pub use compiler::{classpath_classes, ClassCompiler, JvmLanguage, TreeCompiler};
pub use error::JvmError;
pub use flavor::{
    class_abi_jar, is_library_target, library_target, source_abi_jar, verified_source_abi_jar,
    AbiFlavor,
};
pub use jar::{first_abi_difference, ClassEntry, Jar, MemberEntry};
pub use library::{jar_of, ClasspathEntry, JavaLibraryRule, JAVA_LIBRARY_KIND};
pub use planner::LibraryPlan;
pub use source_abi::generate_source_abi;
pub use transformer::JavaLibraryTransformer;
