use crate::errors::{RegistryError, Result};
use crate::package_name::{long_package_path, make_object_path, object_path_to_package_name};
use std::collections::{BTreeMap, HashSet};

pub const GENERATED_CLASS_TAG: &str = "GeneratedClass";
pub const PARENT_CLASS_TAG: &str = "ParentClass";

/// What kind of asset a record describes. Computed once when the record
/// enters the registry so queries never re-derive it from class names.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssetKind {
    #[default]
    Standard = 0,
    // Placeholder that points at the asset that replaced it
    Redirector = 1,
    // Level/world; references to its package are always soft
    Map = 2,
    // Instances define new classes (GeneratedClass/ParentClass tags)
    ClassGenerator = 3,
}

impl AssetKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AssetKind::Standard),
            1 => Ok(AssetKind::Redirector),
            2 => Ok(AssetKind::Map),
            3 => Ok(AssetKind::ClassGenerator),
            other => Err(RegistryError::InvalidAssetKind(other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetRecord {
    pub object_path: String,
    pub package_name: String,
    pub package_path: String,
    pub asset_name: String,
    pub asset_class: String,
    pub tags: BTreeMap<String, String>,
    pub chunk_ids: Vec<i32>,
    pub package_flags: u32,
    pub kind: AssetKind,
}

impl AssetRecord {
    pub fn new(package_name: &str, asset_name: &str, asset_class: &str) -> Self {
        Self {
            object_path: make_object_path(package_name, asset_name),
            package_name: package_name.to_string(),
            package_path: long_package_path(package_name).to_string(),
            asset_name: asset_name.to_string(),
            asset_class: asset_class.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_kind(mut self, kind: AssetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_chunk_ids(mut self, chunk_ids: Vec<i32>) -> Self {
        self.chunk_ids = chunk_ids;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.object_path.is_empty()
    }

    pub fn is_redirector(&self) -> bool {
        self.kind == AssetKind::Redirector
    }

    pub fn is_map(&self) -> bool {
        self.kind == AssetKind::Map
    }

    pub fn is_class_generator(&self) -> bool {
        self.kind == AssetKind::ClassGenerator
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Assigns an [`AssetKind`] from the asset's class name.
#[derive(Debug, Clone, Default)]
pub struct AssetClassifier {
    class_generators: HashSet<String>,
    redirectors: HashSet<String>,
    maps: HashSet<String>,
}

impl AssetClassifier {
    pub fn new<I, S>(class_generators: I, redirectors: I, maps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_generators: class_generators.into_iter().map(Into::into).collect(),
            redirectors: redirectors.into_iter().map(Into::into).collect(),
            maps: maps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, asset_class: &str) -> AssetKind {
        if self.redirectors.contains(asset_class) {
            AssetKind::Redirector
        } else if self.maps.contains(asset_class) {
            AssetKind::Map
        } else if self.class_generators.contains(asset_class) {
            AssetKind::ClassGenerator
        } else {
            AssetKind::Standard
        }
    }

    pub fn apply(&self, record: &mut AssetRecord) {
        record.kind = self.classify(&record.asset_class);
    }
}

/// Raw dependency data for one package as produced by the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDependencyData {
    pub package_name: String,
    /// Package names of direct imports.
    pub imports: Vec<String>,
    /// Object paths referenced by string (lazy references).
    pub soft_references: Vec<String>,
}

impl PackageDependencyData {
    pub fn new(package_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_import(mut self, package_name: &str) -> Self {
        self.imports.push(package_name.to_string());
        self
    }

    pub fn with_soft_reference(mut self, object_path: &str) -> Self {
        self.soft_references.push(object_path.to_string());
        self
    }

    pub fn soft_reference_packages(&self) -> impl Iterator<Item = &str> {
        self.soft_references
            .iter()
            .map(|path| object_path_to_package_name(path))
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_derives_paths() {
        let record = AssetRecord::new("/Game/Props/Crate", "Crate", "StaticMesh");
        assert_eq!(record.object_path, "/Game/Props/Crate.Crate");
        assert_eq!(record.package_path, "/Game/Props");
        assert_eq!(record.kind, AssetKind::Standard);
        assert!(record.is_valid());
    }

    #[test]
    fn classifier_prefers_redirector() {
        let classifier = AssetClassifier::new(
            vec!["Blueprint"],
            vec!["ObjectRedirector"],
            vec!["World"],
        );
        assert_eq!(classifier.classify("ObjectRedirector"), AssetKind::Redirector);
        assert_eq!(classifier.classify("World"), AssetKind::Map);
        assert_eq!(classifier.classify("Blueprint"), AssetKind::ClassGenerator);
        assert_eq!(classifier.classify("Texture2D"), AssetKind::Standard);
    }

    #[test]
    fn soft_references_resolve_to_packages() {
        let data = PackageDependencyData::new("/Game/A")
            .with_soft_reference("/Game/B.B")
            .with_soft_reference("/Game/C");
        let packages: Vec<_> = data.soft_reference_packages().collect();
        assert_eq!(packages, vec!["/Game/B", "/Game/C"]);
    }

    #[test]
    fn kind_round_trips_through_u8() {
        assert_eq!(AssetKind::from_u8(AssetKind::Map as u8).unwrap(), AssetKind::Map);
        assert!(AssetKind::from_u8(9).is_err());
    }
}
