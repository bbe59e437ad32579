use crate::asset_data::AssetClassifier;
use crate::errors::Result;
use crate::package_name::MountPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Class key in [`SerializationOptions::tags_by_class`] that applies to
/// every class.
pub const ANY_CLASS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TagFilterMode {
    #[default]
    Disabled,
    /// Only the listed tags are written.
    AllowList,
    /// Every tag except the listed ones is written.
    DenyList,
}

/// Controls which tags end up in a saved snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationOptions {
    pub tag_filter: TagFilterMode,
    pub tags_by_class: HashMap<String, Vec<String>>,
}

impl SerializationOptions {
    pub fn should_write_tag(&self, asset_class: &str, tag: &str) -> bool {
        let listed = [asset_class, ANY_CLASS].iter().any(|class| {
            self.tags_by_class
                .get(*class)
                .is_some_and(|tags| tags.iter().any(|t| t == tag))
        });

        match self.tag_filter {
            TagFilterMode::Disabled => true,
            TagFilterMode::AllowList => listed,
            TagFilterMode::DenyList => !listed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Wall-clock budget for draining scanner results in one tick. Zero or
    /// less disables the time limit.
    pub max_seconds_per_tick: f64,
    /// Per-kind item budget for one tick.
    pub max_results_per_tick: Option<usize>,
    pub use_world_assets: bool,
    pub search_on_init: bool,
    pub watch_directories: bool,
    pub use_scan_cache: bool,
    pub snapshot_path: Option<PathBuf>,
    pub mount_points: Vec<MountPoint>,
    pub class_generator_classes: Vec<String>,
    pub redirector_classes: Vec<String>,
    pub map_classes: Vec<String>,
    pub serialization: SerializationOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_seconds_per_tick: 0.015,
            max_results_per_tick: None,
            use_world_assets: true,
            search_on_init: false,
            watch_directories: true,
            use_scan_cache: true,
            snapshot_path: None,
            mount_points: vec![MountPoint::new("/Game/", "Content")],
            class_generator_classes: vec![
                "Blueprint".to_string(),
                "AnimBlueprint".to_string(),
                "WidgetBlueprint".to_string(),
            ],
            redirector_classes: vec!["ObjectRedirector".to_string()],
            map_classes: vec!["World".to_string()],
            serialization: SerializationOptions::default(),
        }
    }
}

impl RegistryConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn classifier(&self) -> AssetClassifier {
        AssetClassifier::new(
            self.class_generator_classes.iter().cloned(),
            self.redirector_classes.iter().cloned(),
            self.map_classes.iter().cloned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_data::AssetKind;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let config = RegistryConfig::from_json_str(r#"{ "max_results_per_tick": 100 }"#).unwrap();
        assert_eq!(config.max_results_per_tick, Some(100));
        assert_eq!(config.max_seconds_per_tick, 0.015);
        assert_eq!(config.mount_points, vec![MountPoint::new("/Game", "Content")]);
        assert_eq!(config.classifier().classify("World"), AssetKind::Map);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "use_world_assets": false, "mount_points": [{{ "asset_path": "/Plugin/", "filesystem_path": "Plugins/Foo/Content" }}] }}"#
        )
        .unwrap();

        let config = RegistryConfig::from_file(file.path()).unwrap();
        assert!(!config.use_world_assets);
        assert_eq!(config.mount_points[0].asset_path, "/Plugin/");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RegistryConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn tag_filters_apply_per_class_and_wildcard() {
        let mut options = SerializationOptions {
            tag_filter: TagFilterMode::AllowList,
            tags_by_class: HashMap::from([
                ("Texture2D".to_string(), vec!["Format".to_string()]),
                (ANY_CLASS.to_string(), vec!["ParentClass".to_string()]),
            ]),
        };
        assert!(options.should_write_tag("Texture2D", "Format"));
        assert!(options.should_write_tag("Blueprint", "ParentClass"));
        assert!(!options.should_write_tag("Texture2D", "Width"));

        options.tag_filter = TagFilterMode::DenyList;
        assert!(!options.should_write_tag("Texture2D", "Format"));
        assert!(options.should_write_tag("Texture2D", "Width"));
    }
}
