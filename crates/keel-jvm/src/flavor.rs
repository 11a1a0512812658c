//! Flavors naming the ABI jars of a library.

use once_cell::sync::Lazy;

use keel_target::{Flavor, TargetIdentity};

use crate::error::JvmError;

static CLASS_ABI: Lazy<Flavor> = Lazy::new(|| Flavor::from_static("class-abi"));
static SOURCE_ABI: Lazy<Flavor> = Lazy::new(|| Flavor::from_static("source-abi"));
static VERIFIED_SOURCE_ABI: Lazy<Flavor> = Lazy::new(|| Flavor::from_static("verified-source-abi"));

/// How an ABI jar is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiFlavor {
    /// Stripped from the compiled library jar.
    Class,
    /// Generated from the library's syntax trees.
    Source,
    /// Generated from source and checked against the class ABI.
    VerifiedSource,
}

impl AbiFlavor {
    pub const ALL: [Self; 3] = [Self::Class, Self::Source, Self::VerifiedSource];

    pub fn flavor(self) -> &'static Flavor {
        match self {
            Self::Class => &CLASS_ABI,
            Self::Source => &SOURCE_ABI,
            Self::VerifiedSource => &VERIFIED_SOURCE_ABI,
        }
    }

    /// The single ABI flavor `target` carries.
    ///
    /// # Errors
    /// Returns [`JvmError::NotAnAbiTarget`] unless exactly one ABI flavor is
    /// present.
    pub fn of(target: &TargetIdentity) -> Result<Self, JvmError> {
        let mut present = Self::ALL
            .into_iter()
            .filter(|abi| target.has_flavor(abi.flavor()));
        match (present.next(), present.next()) {
            (Some(abi), None) => Ok(abi),
            _ => Err(JvmError::NotAnAbiTarget {
                target: target.clone(),
                reason: "expected exactly one of the flavors class-abi, source-abi, verified-source-abi",
            }),
        }
    }
}

/// True for a target without any ABI flavor.
pub fn is_library_target(target: &TargetIdentity) -> bool {
    AbiFlavor::ALL
        .into_iter()
        .all(|abi| !target.has_flavor(abi.flavor()))
}

/// The library an ABI target belongs to.
pub fn library_target(target: &TargetIdentity) -> TargetIdentity {
    AbiFlavor::ALL
        .into_iter()
        .fold(target.clone(), |t, abi| t.without_flavor(abi.flavor()))
}

pub fn class_abi_jar(library: &TargetIdentity) -> TargetIdentity {
    library_target(library).with_flavor(AbiFlavor::Class.flavor().clone())
}

pub fn source_abi_jar(library: &TargetIdentity) -> TargetIdentity {
    library_target(library).with_flavor(AbiFlavor::Source.flavor().clone())
}

pub fn verified_source_abi_jar(library: &TargetIdentity) -> TargetIdentity {
    library_target(library).with_flavor(AbiFlavor::VerifiedSource.flavor().clone())
}
