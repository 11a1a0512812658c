use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The `keel.toml` build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub java: JavaConfig,
}

/// Toolchain options for JVM library targets (`[java]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JavaConfig {
    /// Substitute ABI jars for full jars on compile-time classpaths.
    #[serde(default)]
    pub compile_against_abis: bool,
    /// Derive ABI jars directly from source where the toolchain allows it.
    #[serde(default)]
    pub generate_abis_from_source: bool,
    /// What to do when a source ABI and a class ABI disagree.
    #[serde(default)]
    pub source_abi_verification_mode: AbiVerificationMode,
    /// Languages whose compiler can produce an ABI from source.
    #[serde(default = "default_source_abi_languages")]
    pub source_abi_languages: Vec<String>,
}

fn default_source_abi_languages() -> Vec<String> {
    vec!["java".to_owned()]
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            compile_against_abis: false,
            generate_abis_from_source: false,
            source_abi_verification_mode: AbiVerificationMode::default(),
            source_abi_languages: default_source_abi_languages(),
        }
    }
}

impl JavaConfig {
    /// Whether the configured toolchain supports source ABIs for `language`.
    pub fn supports_source_abi(&self, language: &str) -> bool {
        self.source_abi_languages.iter().any(|l| l == language)
    }
}

/// Governs what happens when a source-derived ABI diverges from a class-derived one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiVerificationMode {
    /// Source ABIs are trusted; no comparison rule is created.
    #[default]
    Off,
    /// Mismatches are reported but do not fail the build.
    Warn,
    /// Mismatches fail the build.
    Error,
}

impl fmt::Display for AbiVerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

impl BuildConfig {
    /// Read and parse a `keel.toml` from the given path.
    /// Returns the default configuration if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_owned(),
            source: e,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid keel.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}
