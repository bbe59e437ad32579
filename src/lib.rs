//! In-memory index of game assets: what exists, where it lives, what class it
//! is, and which packages depend on which.

pub mod asset_data;
pub mod asset_store;
pub mod class_hierarchy;
pub mod config;
pub mod depends;
pub mod errors;
pub mod events;
pub mod filter;
pub mod gatherer;
pub mod live;
pub mod package_name;
pub mod path_tree;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod registry;
pub mod serialization;
pub mod versions;
pub mod watcher;

pub use asset_data::{AssetClassifier, AssetKind, AssetRecord, PackageDependencyData};
pub use config::RegistryConfig;
pub use depends::{DependencyKind, DependencyQuery};
pub use errors::{RegistryError, Result};
pub use events::RegistryEvent;
pub use filter::AssetFilter;
pub use registry::AssetRegistry;
