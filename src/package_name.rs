//! Helpers for long package names, object paths and mount points.
//!
//! A long package name looks like `/Game/Maps/Arena`, its package path is the
//! folder `/Game/Maps` and an object path names one asset inside the package:
//! `/Game/Maps/Arena.Arena`.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const ASSET_PACKAGE_EXTENSION: &str = "uasset";
pub const MAP_PACKAGE_EXTENSION: &str = "umap";

/// Returns the folder that contains `package_name`.
pub fn long_package_path(package_name: &str) -> &str {
    match package_name.rfind('/') {
        Some(idx) => &package_name[..idx],
        None => "",
    }
}

pub fn make_object_path(package_name: &str, asset_name: &str) -> String {
    format!("{package_name}.{asset_name}")
}

/// Strips the object part of an object path, `/Game/A.B` becomes `/Game/A`.
pub fn object_path_to_package_name(object_path: &str) -> &str {
    match object_path.find('.') {
        Some(idx) => &object_path[..idx],
        None => object_path,
    }
}

/// Returns the object name at the end of an object path.
pub fn object_path_to_object_name(object_path: &str) -> &str {
    match object_path.rfind(['.', ':']) {
        Some(idx) => &object_path[idx + 1..],
        None => object_path,
    }
}

/// Converts `Class'/Game/A.B'` to `/Game/A.B`. Plain paths are returned as is.
pub fn export_text_path_to_object_path(export_text_path: &str) -> &str {
    match (export_text_path.find('\''), export_text_path.rfind('\'')) {
        (Some(open), Some(close)) if close > open => &export_text_path[open + 1..close],
        _ => export_text_path,
    }
}

pub fn export_text_path_to_object_name(export_text_path: &str) -> &str {
    object_path_to_object_name(export_text_path_to_object_path(export_text_path))
}

pub fn is_package_extension(extension: &str) -> bool {
    extension.eq_ignore_ascii_case(ASSET_PACKAGE_EXTENSION)
        || extension.eq_ignore_ascii_case(MAP_PACKAGE_EXTENSION)
}

/// Adds a trailing slash to a mount root, `/Game` becomes `/Game/`.
pub fn with_trailing_slash(asset_path: &str) -> String {
    if asset_path.ends_with('/') {
        asset_path.to_string()
    } else {
        format!("{asset_path}/")
    }
}

pub fn without_trailing_slash(asset_path: &str) -> &str {
    asset_path.strip_suffix('/').unwrap_or(asset_path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    /// Logical root with a trailing slash, e.g. `/Game/`.
    pub asset_path: String,
    pub filesystem_path: PathBuf,
}

impl MountPoint {
    pub fn new(asset_path: &str, filesystem_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_path: with_trailing_slash(asset_path),
            filesystem_path: filesystem_path.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<MountPoint>,
}

impl MountTable {
    pub fn new(mounts: impl IntoIterator<Item = MountPoint>) -> Self {
        let mut table = Self::default();
        for mount in mounts {
            table.insert(mount);
        }
        table
    }

    pub fn insert(&mut self, mount: MountPoint) {
        self.mounts.retain(|m| m.asset_path != mount.asset_path);
        self.mounts.push(mount);
    }

    pub fn remove(&mut self, asset_path: &str) -> Option<MountPoint> {
        let asset_path = with_trailing_slash(asset_path);
        let idx = self.mounts.iter().position(|m| m.asset_path == asset_path)?;
        Some(self.mounts.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountPoint> {
        self.mounts.iter()
    }

    pub fn root_asset_paths(&self) -> Vec<String> {
        self.mounts.iter().map(|m| m.asset_path.clone()).collect()
    }

    /// Maps a package file on disk to its long package name. The longest
    /// matching filesystem root wins.
    pub fn try_convert_filename_to_long_package_name(&self, filename: &Path) -> Option<String> {
        let mount = self
            .mounts
            .iter()
            .filter(|m| filename.starts_with(&m.filesystem_path))
            .max_by_key(|m| m.filesystem_path.components().count())?;

        let relative = filename.strip_prefix(&mount.filesystem_path).ok()?;
        let relative = relative.with_extension("");

        let mut package_name = without_trailing_slash(&mount.asset_path).to_string();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    package_name.push('/');
                    package_name.push_str(part.to_str()?);
                }
                _ => return None,
            }
        }

        if package_name.len() <= mount.asset_path.len() {
            return None;
        }
        Some(package_name)
    }

    pub fn long_package_name_to_filename(&self, package_name: &str, extension: &str) -> Option<PathBuf> {
        let mount = self
            .mounts
            .iter()
            .filter(|m| package_name.starts_with(m.asset_path.as_str()))
            .max_by_key(|m| m.asset_path.len())?;

        let relative = &package_name[mount.asset_path.len()..];
        let mut filename = mount.filesystem_path.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            filename.push(part);
        }
        filename.set_extension(extension);
        Some(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_object_paths() {
        assert_eq!(long_package_path("/Game/Maps/Arena"), "/Game/Maps");
        assert_eq!(object_path_to_package_name("/Game/Maps/Arena.Arena"), "/Game/Maps/Arena");
        assert_eq!(object_path_to_object_name("/Game/Maps/Arena.Arena"), "Arena");
        assert_eq!(make_object_path("/Game/Foo", "Foo"), "/Game/Foo.Foo");
    }

    #[test]
    fn converts_export_text_paths() {
        assert_eq!(
            export_text_path_to_object_name("BlueprintGeneratedClass'/Game/BP_Door.BP_Door_C'"),
            "BP_Door_C"
        );
        assert_eq!(export_text_path_to_object_name("/Script/Engine.Actor"), "Actor");
        assert_eq!(export_text_path_to_object_name("Actor"), "Actor");
    }

    #[test]
    fn converts_filenames_through_mounts() {
        let table = MountTable::new([
            MountPoint::new("/Game", "/project/Content"),
            MountPoint::new("/Plugin/", "/project/Content/Plugins/Plugin"),
        ]);

        assert_eq!(
            table.try_convert_filename_to_long_package_name(Path::new("/project/Content/Maps/Arena.umap")),
            Some("/Game/Maps/Arena".to_string())
        );
        assert_eq!(
            table.try_convert_filename_to_long_package_name(Path::new(
                "/project/Content/Plugins/Plugin/Mesh.uasset"
            )),
            Some("/Plugin/Mesh".to_string())
        );
        assert_eq!(
            table.try_convert_filename_to_long_package_name(Path::new("/elsewhere/Mesh.uasset")),
            None
        );
        assert_eq!(
            table.long_package_name_to_filename("/Game/Maps/Arena", MAP_PACKAGE_EXTENSION),
            Some(PathBuf::from("/project/Content/Maps/Arena.umap"))
        );
    }

    #[test]
    fn mount_table_replaces_existing_root() {
        let mut table = MountTable::new([MountPoint::new("/Game", "/a")]);
        table.insert(MountPoint::new("/Game/", "/b"));
        assert_eq!(table.iter().count(), 1);
        assert_eq!(table.remove("/Game").map(|m| m.filesystem_path), Some(PathBuf::from("/b")));
        assert!(table.root_asset_paths().is_empty());
    }
}
