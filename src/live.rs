//! Objects currently resident in memory.
//!
//! The registry never owns these; it reads them through [`LiveObjects`] when
//! answering queries so that loaded assets shadow their cached copies.

use crate::asset_data::AssetRecord;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAsset {
    pub record: AssetRecord,
    pub package_contains_map: bool,
    pub loaded_for_diffing: bool,
}

impl LiveAsset {
    pub fn new(record: AssetRecord) -> Self {
        Self {
            package_contains_map: record.is_map(),
            record,
            loaded_for_diffing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveClass {
    pub name: String,
    pub parent: Option<String>,
    pub deprecated: bool,
}

impl LiveClass {
    pub fn new(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            deprecated: false,
        }
    }
}

pub trait LiveObjects: Send + Sync {
    fn assets(&self) -> Vec<LiveAsset>;

    /// Assets whose class is exactly `class_name`.
    fn assets_of_class(&self, class_name: &str) -> Vec<LiveAsset>;

    fn find_asset(&self, object_path: &str) -> Option<LiveAsset>;

    fn classes(&self) -> Vec<LiveClass>;
}

/// Used when the host has no object system to expose.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLiveObjects;

impl LiveObjects for NoLiveObjects {
    fn assets(&self) -> Vec<LiveAsset> {
        Vec::new()
    }

    fn assets_of_class(&self, _class_name: &str) -> Vec<LiveAsset> {
        Vec::new()
    }

    fn find_asset(&self, _object_path: &str) -> Option<LiveAsset> {
        None
    }

    fn classes(&self) -> Vec<LiveClass> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct LoadedObjectsInner {
    assets: HashMap<String, LiveAsset>,
    classes: HashMap<String, LiveClass>,
}

/// A simple table of loaded assets and classes that hosts can keep in sync
/// with their own object system.
#[derive(Debug, Default)]
pub struct LoadedObjects {
    inner: RwLock<LoadedObjectsInner>,
}

impl LoadedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&self, asset: LiveAsset) {
        let mut inner = self.inner.write();
        inner.assets.insert(asset.record.object_path.clone(), asset);
    }

    pub fn remove_asset(&self, object_path: &str) -> Option<LiveAsset> {
        self.inner.write().assets.remove(object_path)
    }

    pub fn insert_class(&self, class: LiveClass) {
        let mut inner = self.inner.write();
        inner.classes.insert(class.name.clone(), class);
    }

    pub fn is_package_empty(&self, package_name: &str) -> bool {
        !self
            .inner
            .read()
            .assets
            .values()
            .any(|asset| asset.record.package_name == package_name)
    }
}

impl LiveObjects for LoadedObjects {
    fn assets(&self) -> Vec<LiveAsset> {
        self.inner.read().assets.values().cloned().collect()
    }

    fn assets_of_class(&self, class_name: &str) -> Vec<LiveAsset> {
        self.inner
            .read()
            .assets
            .values()
            .filter(|asset| asset.record.asset_class == class_name)
            .cloned()
            .collect()
    }

    fn find_asset(&self, object_path: &str) -> Option<LiveAsset> {
        self.inner.read().assets.get(object_path).cloned()
    }

    fn classes(&self) -> Vec<LiveClass> {
        self.inner.read().classes.values().cloned().collect()
    }
}
