//! Parse and validate `keel.toml`.

pub mod config;

pub use config::{AbiVerificationMode, BuildConfig, ConfigError, JavaConfig};
