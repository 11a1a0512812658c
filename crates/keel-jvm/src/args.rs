//! Arguments of a `java_library` target.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use keel_target::TargetIdentity;
use keel_types::SourceSet;
use keel_util::error::UtilError;
use keel_util::hash::sha256_json;

use crate::compiler::JvmLanguage;

/// Kind-specific arguments of a library node. Dependencies are the node's
/// edges, not arguments.
#[derive(Debug, Clone, Default)]
pub struct JavaLibraryArgs {
    pub language: JvmLanguage,
    pub srcs: SourceSet,
    /// Resource contents by path.
    pub resources: BTreeMap<String, String>,
    pub manifest_file: Option<String>,
    /// Commands that rewrite classes after compilation.
    pub postprocess_classes_commands: Vec<String>,
    /// Per-target override of source ABI generation; `None` allows it.
    pub generate_abi_from_source: Option<bool>,
    /// Whether dependents need this library to derive their own source ABIs.
    pub required_for_source_abi: bool,
    pub maven_coords: Option<String>,
    pub tests: BTreeSet<TargetIdentity>,
}

/// What goes into a library's input digest.
#[derive(Serialize)]
struct DigestView<'a> {
    language: &'a JvmLanguage,
    srcs: &'a SourceSet,
    resources: &'a BTreeMap<String, String>,
    manifest_file: &'a Option<String>,
    postprocess_classes_commands: &'a [String],
}

impl JavaLibraryArgs {
    pub fn new(srcs: SourceSet) -> Self {
        Self {
            srcs,
            ..Self::default()
        }
    }

    pub fn language(mut self, language: JvmLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn resource(mut self, path: &str, contents: &str) -> Self {
        self.resources.insert(path.to_owned(), contents.to_owned());
        self
    }

    pub fn manifest(mut self, manifest: &str) -> Self {
        self.manifest_file = Some(manifest.to_owned());
        self
    }

    pub fn postprocess(mut self, command: &str) -> Self {
        self.postprocess_classes_commands.push(command.to_owned());
        self
    }

    pub fn abi_from_source(mut self, allowed: bool) -> Self {
        self.generate_abi_from_source = Some(allowed);
        self
    }

    /// A library produces a jar iff it has sources, resources, or a manifest.
    pub fn produces_output(&self) -> bool {
        !self.srcs.is_empty() || !self.resources.is_empty() || self.manifest_file.is_some()
    }

    /// Digest of everything that shapes the compiled jar.
    ///
    /// # Errors
    /// Returns an error if the arguments cannot be serialized.
    pub fn inputs_digest(&self) -> Result<String, UtilError> {
        sha256_json(&DigestView {
            language: &self.language,
            srcs: &self.srcs,
            resources: &self.resources,
            manifest_file: &self.manifest_file,
            postprocess_classes_commands: &self.postprocess_classes_commands,
        })
    }
}
