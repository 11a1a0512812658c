//! Build target identities and flavors for Keel.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A variant tag appended to a target identity after `#`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flavor(String);

impl Flavor {
    /// Create a flavor, validating its name.
    ///
    /// # Errors
    /// Returns an error if the name is empty or contains characters other than
    /// ASCII alphanumerics, `-`, `_`, and `.`.
    pub fn new(name: &str) -> Result<Self, TargetError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(TargetError::InvalidFlavor {
                flavor: name.to_owned(),
            });
        }
        Ok(Self(name.to_owned()))
    }

    /// Create a flavor from a name known at compile time to be valid.
    pub fn from_static(name: &'static str) -> Self {
        debug_assert!(Self::new(name).is_ok(), "invalid static flavor {name}");
        Self(name.to_owned())
    }

    /// The flavor name without the leading `#`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique name of one build target: `[cell]//base/path:name[#flavor,...]`.
///
/// Identities are immutable; the `with_*`/`without_*` helpers return new values.
/// Ordering is lexicographic over cell, base path, name, then flavors, which
/// gives rule sets a stable iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetIdentity {
    cell: Option<String>,
    base_path: String,
    name: String,
    flavors: BTreeSet<Flavor>,
}

impl TargetIdentity {
    /// Create an unflavored identity in the root cell.
    ///
    /// # Errors
    /// Returns an error if the name is empty or contains `:`, `/`, or `#`.
    pub fn new(base_path: &str, name: &str) -> Result<Self, TargetError> {
        validate_name(name)?;
        Ok(Self {
            cell: None,
            base_path: base_path.trim_matches('/').to_owned(),
            name: name.to_owned(),
            flavors: BTreeSet::new(),
        })
    }

    /// Parse the textual form of a target.
    ///
    /// # Errors
    /// Returns an error if the text lacks `//` or `:`, or if the name or any
    /// flavor is invalid.
    pub fn parse(text: &str) -> Result<Self, TargetError> {
        let (unflavored, flavor_part) = match text.split_once('#') {
            Some((head, tail)) => (head, Some(tail)),
            None => (text, None),
        };

        let Some((cell, rest)) = unflavored.split_once("//") else {
            return Err(TargetError::Malformed {
                text: text.to_owned(),
                reason: "missing `//`".to_owned(),
            });
        };
        let Some((base_path, name)) = rest.rsplit_once(':') else {
            return Err(TargetError::Malformed {
                text: text.to_owned(),
                reason: "missing `:` before the target name".to_owned(),
            });
        };
        validate_name(name)?;

        let mut flavors = BTreeSet::new();
        if let Some(part) = flavor_part {
            for raw in part.split(',') {
                flavors.insert(Flavor::new(raw)?);
            }
        }

        Ok(Self {
            cell: (!cell.is_empty()).then(|| cell.to_owned()),
            base_path: base_path.trim_matches('/').to_owned(),
            name: name.to_owned(),
            flavors,
        })
    }

    /// The cell name, or `None` for the root cell.
    pub fn cell(&self) -> Option<&str> {
        self.cell.as_deref()
    }

    /// The package path, without leading or trailing slashes.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The short name after `:`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flavor set, in sorted order.
    pub fn flavors(&self) -> &BTreeSet<Flavor> {
        &self.flavors
    }

    pub fn is_flavored(&self) -> bool {
        !self.flavors.is_empty()
    }

    pub fn has_flavor(&self, flavor: &Flavor) -> bool {
        self.flavors.contains(flavor)
    }

    /// Return a copy of this identity with `flavor` added.
    pub fn with_flavor(&self, flavor: Flavor) -> Self {
        let mut next = self.clone();
        next.flavors.insert(flavor);
        next
    }

    /// Return a copy of this identity with `flavor` removed.
    pub fn without_flavor(&self, flavor: &Flavor) -> Self {
        let mut next = self.clone();
        next.flavors.remove(flavor);
        next
    }

    /// Return the unflavored identity.
    pub fn without_flavors(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            base_path: self.base_path.clone(),
            name: self.name.clone(),
            flavors: BTreeSet::new(),
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cell) = &self.cell {
            f.write_str(cell)?;
        }
        write!(f, "//{}:{}", self.base_path, self.name)?;
        let mut separator = '#';
        for flavor in &self.flavors {
            write!(f, "{separator}{flavor}")?;
            separator = ',';
        }
        Ok(())
    }
}

impl FromStr for TargetIdentity {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_name(name: &str) -> Result<(), TargetError> {
    if name.is_empty() || name.contains([':', '/', '#']) {
        return Err(TargetError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("malformed target \"{text}\": {reason}")]
    Malformed { text: String, reason: String },

    #[error("invalid target name \"{name}\": names must be non-empty and must not contain `:`, `/`, or `#`")]
    InvalidName { name: String },

    #[error("invalid flavor \"{flavor}\": only alphanumeric characters, dots, hyphens, and underscores are allowed")]
    InvalidFlavor { flavor: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_root_cell_target() {
        let target = TargetIdentity::parse("//foo/bar:baz").unwrap();
        assert_eq!(target.cell(), None);
        assert_eq!(target.base_path(), "foo/bar");
        assert_eq!(target.name(), "baz");
        assert!(!target.is_flavored());
        assert_eq!(target.to_string(), "//foo/bar:baz");
    }

    #[test]
    fn parse_cell_and_flavors() {
        let target = TargetIdentity::parse("tools//java:lib#source-abi").unwrap();
        assert_eq!(target.cell(), Some("tools"));
        assert!(target.has_flavor(&Flavor::new("source-abi").unwrap()));
        assert_eq!(target.to_string(), "tools//java:lib#source-abi");
    }

    #[test]
    fn flavors_are_an_unordered_set() {
        let a = TargetIdentity::parse("//x:y#b,a").unwrap();
        let b = TargetIdentity::parse("//x:y#a,b").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "//x:y#a,b");
    }

    #[test]
    fn empty_base_path_is_allowed() {
        let target = TargetIdentity::parse("//:target").unwrap();
        assert_eq!(target.base_path(), "");
        assert_eq!(target.to_string(), "//:target");
    }

    #[test]
    fn missing_slashes_rejected() {
        let err = TargetIdentity::parse("foo:bar").unwrap_err().to_string();
        assert!(err.contains("missing `//`"), "error was: {err}");
    }

    #[test]
    fn missing_colon_rejected() {
        let err = TargetIdentity::parse("//foo/bar").unwrap_err().to_string();
        assert!(err.contains("missing `:`"), "error was: {err}");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(TargetIdentity::parse("//foo:").is_err());
    }

    #[test]
    fn empty_flavor_rejected() {
        assert!(TargetIdentity::parse("//foo:bar#").is_err());
        assert!(TargetIdentity::parse("//foo:bar#a,,b").is_err());
    }

    #[test]
    fn with_and_without_flavor() {
        let base = TargetIdentity::new("foo", "bar").unwrap();
        let abi = Flavor::new("class-abi").unwrap();
        let flavored = base.with_flavor(abi.clone());
        assert_eq!(flavored.to_string(), "//foo:bar#class-abi");
        assert_eq!(flavored.without_flavor(&abi), base);
        assert_eq!(flavored.without_flavors(), base);
    }

    #[test]
    fn ordering_is_by_path_then_name() {
        let mut targets = vec![
            TargetIdentity::parse("//b:a").unwrap(),
            TargetIdentity::parse("//a:b").unwrap(),
            TargetIdentity::parse("//a:a#x").unwrap(),
            TargetIdentity::parse("//a:a").unwrap(),
        ];
        targets.sort();
        let rendered: Vec<String> = targets.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["//a:a", "//a:a#x", "//a:b", "//b:a"]);
    }

    proptest! {
        /// Arbitrary input must never cause the parser to panic.
        #[test]
        fn parse_never_panics(text in ".*") {
            let _ = TargetIdentity::parse(&text);
        }

        /// Valid identities survive a display/parse round trip.
        #[test]
        fn display_parses_back(
            path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}",
            name in "[a-z][a-z0-9_-]{0,10}",
            flavor in proptest::option::of("[a-z][a-z-]{0,10}"),
        ) {
            let mut target = TargetIdentity::new(&path, &name).unwrap();
            if let Some(flavor) = flavor {
                target = target.with_flavor(Flavor::new(&flavor).unwrap());
            }
            let reparsed = TargetIdentity::parse(&target.to_string()).unwrap();
            prop_assert_eq!(reparsed, target);
        }
    }
}
