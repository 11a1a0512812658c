//! Content-addressed rule keys.
//!
//! A rule needs to run again exactly when its key changes. Keys cover the
//! rule's own inputs and the *output* digests of its dependencies, so a
//! dependency whose output is unchanged does not invalidate its consumers.

use std::fmt;

use keel_util::hash::sha256_multi;

use crate::error::EngineError;
use crate::rule::BuildRule;

/// A SHA-256 hex digest identifying one evaluation of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey(String);

impl RuleKey {
    /// Compute the key of `rule`.
    ///
    /// Build deps are visited in target order, so the key does not depend on
    /// the order in which the rule collected them.
    ///
    /// # Errors
    /// Returns an error if the rule's input digest or a dependency's output
    /// digest cannot be computed.
    pub fn compute(rule: &dyn BuildRule) -> Result<Self, EngineError> {
        let target = rule.target().to_string();
        let input = rule.input_digest()?;

        let mut dep_parts = Vec::new();
        for dep in rule.build_deps() {
            dep_parts.push(dep.target().to_string());
            dep_parts.push(dep.output_digest()?);
        }

        let mut parts: Vec<&str> = vec![rule.rule_type(), &target, &input];
        parts.extend(dep_parts.iter().map(String::as_str));

        Ok(Self(sha256_multi(&parts)))
    }

    /// Return the hex string representation of this key.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
