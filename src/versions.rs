use crate::errors::{RegistryError, Result};

/// Magic value written at the start of every versioned snapshot.
pub const REGISTRY_MAGIC: u32 = 0x5241_4731;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SnapshotVersion {
    // Files written before the header existed: asset count first, no dependency section
    PreVersioning = 0,

    // Header, asset kind and package flags, hard dependencies and referencers per asset
    AddedDependencies,

    // Separate hard and soft dependency lists
    HardSoftDependencies,
}

impl SnapshotVersion {
    pub const LATEST: SnapshotVersion = SnapshotVersion::HardSoftDependencies;

    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(SnapshotVersion::PreVersioning),
            1 => Ok(SnapshotVersion::AddedDependencies),
            2 => Ok(SnapshotVersion::HardSoftDependencies),
            other => Err(RegistryError::UnsupportedVersion(other)),
        }
    }

    pub fn has_dependencies(self) -> bool {
        self >= SnapshotVersion::AddedDependencies
    }

    pub fn has_soft_dependencies(self) -> bool {
        self >= SnapshotVersion::HardSoftDependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ordered() {
        assert!(SnapshotVersion::PreVersioning < SnapshotVersion::LATEST);
        assert!(!SnapshotVersion::PreVersioning.has_dependencies());
        assert!(SnapshotVersion::AddedDependencies.has_dependencies());
        assert!(!SnapshotVersion::AddedDependencies.has_soft_dependencies());
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(matches!(
            SnapshotVersion::from_i32(42),
            Err(RegistryError::UnsupportedVersion(42))
        ));
        assert_eq!(
            SnapshotVersion::from_i32(2).ok(),
            Some(SnapshotVersion::HardSoftDependencies)
        );
    }
}
