//! A structural model of compiled jars and their ABIs.
//!
//! Jars are compared by the signatures they declare, never by bytes. A
//! member's key is its rendered signature (`method bar(int): long`), so two
//! jars agree on a member exactly when they agree on its key and visibility.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use keel_types::{qualify, ClassKind, ClasspathClass, Visibility};
use keel_util::error::UtilError;
use keel_util::hash::sha256_json;

/// One member of a compiled class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberEntry {
    pub visibility: Visibility,
    /// Digest of the method body or field initializer. Always `None` in an ABI.
    pub body_digest: Option<String>,
}

/// One compiled class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassEntry {
    pub package: String,
    /// Simple name, or `Outer.Inner` for a nested class.
    pub name: String,
    pub kind: ClassKind,
    pub visibility: Visibility,
    /// Type parameter declarations with their bounds, e.g. `T extends java.lang.Number`.
    pub type_parameters: Vec<String>,
    /// Everything after the type parameters: `extends` and `implements` clauses.
    pub supertypes: String,
    pub members: BTreeMap<String, MemberEntry>,
}

impl ClassEntry {
    pub fn qualified_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// The declaration line: `public class Foo<T> extends java.lang.Object`.
    pub fn header(&self) -> String {
        let mut header = String::new();
        let keyword = self.visibility.keyword();
        if !keyword.is_empty() {
            header.push_str(keyword);
            header.push(' ');
        }
        header.push_str(self.kind.keyword());
        header.push(' ');
        header.push_str(&self.name);
        if !self.type_parameters.is_empty() {
            header.push('<');
            header.push_str(&self.type_parameters.join(", "));
            header.push('>');
        }
        if !self.supertypes.is_empty() {
            header.push(' ');
            header.push_str(&self.supertypes);
        }
        header
    }

    fn type_parameter_names(&self) -> Vec<String> {
        self.type_parameters
            .iter()
            .filter_map(|decl| decl.split_whitespace().next())
            .map(str::to_owned)
            .collect()
    }
}

/// The contents of a library jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Jar {
    /// Classes by qualified name.
    pub classes: BTreeMap<String, ClassEntry>,
    /// Resource digests by path.
    pub resources: BTreeMap<String, String>,
    pub manifest: Option<String>,
}

impl Jar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&mut self, class: ClassEntry) {
        self.classes.insert(class.qualified_name(), class);
    }

    pub fn class(&self, qualified_name: &str) -> Option<&ClassEntry> {
        self.classes.get(qualified_name)
    }

    /// SHA-256 of the jar's canonical JSON form.
    ///
    /// # Errors
    /// Returns an error if the jar cannot be serialized.
    pub fn digest(&self) -> Result<String, UtilError> {
        sha256_json(self)
    }

    /// The jar as seen by code compiled against it: no private classes or
    /// members, no bodies, no resources, no manifest.
    pub fn to_abi(&self) -> Jar {
        let classes = self
            .classes
            .iter()
            .filter(|(_, class)| class.visibility.is_visible())
            .map(|(name, class)| {
                let members = class
                    .members
                    .iter()
                    .filter(|(_, member)| member.visibility.is_visible())
                    .map(|(key, member)| {
                        let stripped = MemberEntry {
                            visibility: member.visibility,
                            body_digest: None,
                        };
                        (key.clone(), stripped)
                    })
                    .collect();
                let abi_class = ClassEntry {
                    members,
                    ..class.clone()
                };
                (name.clone(), abi_class)
            })
            .collect();
        Jar {
            classes,
            resources: BTreeMap::new(),
            manifest: None,
        }
    }

    /// What a compiler sees of this jar on its classpath.
    pub fn classpath_classes(&self) -> Vec<ClasspathClass> {
        self.classes
            .values()
            .map(|class| {
                let names = class.type_parameter_names();
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                ClasspathClass::new(&class.package, &class.name, class.kind)
                    .with_type_parameters(&names)
            })
            .collect()
    }
}

/// The first place two ABIs disagree, in class then member order.
///
/// A missing or differing class is reported by its qualified name, a
/// differing declaration as `Class#<header>`, and a member as `Class#key`.
pub fn first_abi_difference(left: &Jar, right: &Jar) -> Option<String> {
    let names: BTreeSet<&String> = left.classes.keys().chain(right.classes.keys()).collect();
    for name in names {
        let (Some(l), Some(r)) = (left.classes.get(name), right.classes.get(name)) else {
            return Some(name.clone());
        };
        if l.header() != r.header() {
            return Some(format!("{name}#<header>"));
        }
        let keys: BTreeSet<&String> = l.members.keys().chain(r.members.keys()).collect();
        for key in keys {
            let same = match (l.members.get(key), r.members.get(key)) {
                (Some(a), Some(b)) => a.visibility == b.visibility,
                _ => false,
            };
            if !same {
                return Some(format!("{name}#{key}"));
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn member(visibility: Visibility, body: Option<&str>) -> MemberEntry {
        MemberEntry {
            visibility,
            body_digest: body.map(str::to_owned),
        }
    }

    fn foo() -> ClassEntry {
        let mut members = BTreeMap::new();
        members.insert("method bar(): int".to_owned(), member(Visibility::Public, Some("b1")));
        members.insert("method helper(): void".to_owned(), member(Visibility::Private, Some("b2")));
        members.insert("field count: int".to_owned(), member(Visibility::Protected, Some("0")));
        ClassEntry {
            package: "com.example".to_owned(),
            name: "Foo".to_owned(),
            kind: ClassKind::Class,
            visibility: Visibility::Public,
            type_parameters: vec!["T extends java.lang.Number".to_owned()],
            supertypes: "extends java.lang.Object".to_owned(),
            members,
        }
    }

    fn jar_with(classes: Vec<ClassEntry>) -> Jar {
        let mut jar = Jar::new();
        for class in classes {
            jar.insert_class(class);
        }
        jar
    }

    #[test]
    fn header_renders_declaration() {
        assert_eq!(
            foo().header(),
            "public class Foo<T extends java.lang.Number> extends java.lang.Object"
        );
    }

    #[test]
    fn abi_drops_private_members_bodies_and_resources() {
        let mut jar = jar_with(vec![foo()]);
        jar.resources.insert("a.txt".to_owned(), "digest".to_owned());
        jar.manifest = Some("Main-Class: Foo".to_owned());
        let hidden = ClassEntry {
            name: "Hidden".to_owned(),
            visibility: Visibility::Private,
            ..foo()
        };
        jar.insert_class(hidden);

        let abi = jar.to_abi();
        assert!(abi.resources.is_empty());
        assert_eq!(abi.manifest, None);
        assert!(abi.class("com.example.Hidden").is_none());
        let class = abi.class("com.example.Foo").unwrap();
        let keys: Vec<&str> = class.members.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["field count: int", "method bar(): int"]);
        assert!(class.members.values().all(|m| m.body_digest.is_none()));
    }

    #[test]
    fn body_changes_do_not_reach_the_abi() {
        let before = jar_with(vec![foo()]);
        let mut changed = foo();
        changed
            .members
            .insert("method bar(): int".to_owned(), member(Visibility::Public, Some("b9")));
        let after = jar_with(vec![changed]);

        assert_ne!(before.digest().unwrap(), after.digest().unwrap());
        assert_eq!(before.to_abi().digest().unwrap(), after.to_abi().digest().unwrap());
    }

    #[test]
    fn difference_names_the_member() {
        let left = jar_with(vec![foo()]);
        let mut changed = foo();
        let bar = changed.members.remove("method bar(): int").unwrap();
        changed.members.insert("method bar(): long".to_owned(), bar);
        let right = jar_with(vec![changed]);

        assert_eq!(
            first_abi_difference(&left.to_abi(), &right.to_abi()).as_deref(),
            Some("com.example.Foo#method bar(): int")
        );
        assert_eq!(first_abi_difference(&left.to_abi(), &left.to_abi()), None);
    }

    #[test]
    fn difference_in_visibility_or_header() {
        let left = jar_with(vec![foo()]);
        let mut widened = foo();
        widened.members.insert(
            "field count: int".to_owned(),
            member(Visibility::Public, None),
        );
        assert_eq!(
            first_abi_difference(&left, &jar_with(vec![widened])).as_deref(),
            Some("com.example.Foo#field count: int")
        );

        let mut reparented = foo();
        reparented.supertypes = "extends java.lang.Exception".to_owned();
        assert_eq!(
            first_abi_difference(&left, &jar_with(vec![reparented])).as_deref(),
            Some("com.example.Foo#<header>")
        );
        assert_eq!(
            first_abi_difference(&left, &Jar::new()).as_deref(),
            Some("com.example.Foo")
        );
    }

    #[test]
    fn classpath_view_keeps_type_parameter_names() {
        let classes = jar_with(vec![foo()]).classpath_classes();
        assert_eq!(classes.len(), 1);
        let class = classes.first().unwrap();
        assert_eq!(class.qualified_name(), "com.example.Foo");
        assert_eq!(class.type_parameters, vec!["T".to_owned()]);
    }

    proptest! {
        #[test]
        fn abi_is_idempotent(
            names in proptest::collection::btree_set("[a-z]{1,6}", 0..6),
            private_mask in any::<u8>(),
        ) {
            let mut class = foo();
            class.members.clear();
            for (i, name) in names.iter().enumerate() {
                let visibility = if private_mask & (1 << (i % 8)) != 0 {
                    Visibility::Private
                } else {
                    Visibility::Public
                };
                class.members.insert(format!("method {name}(): void"), member(visibility, Some(name)));
            }
            let abi = jar_with(vec![class]).to_abi();
            prop_assert_eq!(abi.to_abi(), abi.clone());
            prop_assert_eq!(first_abi_difference(&abi, &abi.to_abi()), None);
        }
    }
}
