//! Binary snapshot of the registry.
//!
//! Layout (little endian):
//!
//! ```text
//! u32 magic, i32 version            absent in PreVersioning files
//! i32 asset count
//! asset records                      strings, kind/flags (versioned only), tags, chunk ids
//! per asset dependency block         versioned only, same order as the records
//!   hard indices
//!   soft indices                     HardSoftDependencies only
//!   referencer indices
//! ```
//!
//! Dependency indices point at the first record of the target package. Only
//! the first record of each package carries a block; the others write empty
//! lists.

use crate::asset_data::{AssetClassifier, AssetKind, AssetRecord};
use crate::asset_store::AssetStore;
use crate::config::SerializationOptions;
use crate::errors::{RegistryError, Result};
use crate::reader::{RegistryReader, RegistryWriter};
use crate::versions::{REGISTRY_MAGIC, SnapshotVersion};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{Read, Write};
use std::time::Instant;
use tracing::{debug, info};

const MAX_ASSETS: usize = 1 << 24;
const MAX_TAGS: usize = 1 << 12;
const MAX_CHUNK_IDS: usize = 1 << 12;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDependencies {
    pub hard: Vec<usize>,
    pub soft: Vec<usize>,
    pub referencers: Vec<usize>,
}

impl SnapshotDependencies {
    pub fn is_empty(&self) -> bool {
        self.hard.is_empty() && self.soft.is_empty() && self.referencers.is_empty()
    }
}

/// A decoded snapshot, before it is merged into a store.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub version: Option<SnapshotVersion>,
    pub assets: Vec<AssetRecord>,
    /// One entry per asset, empty for PreVersioning files.
    pub dependencies: Vec<SnapshotDependencies>,
}

impl RegistrySnapshot {
    pub fn version(&self) -> SnapshotVersion {
        self.version.unwrap_or(SnapshotVersion::PreVersioning)
    }

    pub fn package_name_at(&self, index: usize) -> Option<&str> {
        self.assets.get(index).map(|a| a.package_name.as_str())
    }

    /// Adds every record to `store` and rebuilds the dependency nodes.
    /// Returns the number of records merged.
    pub fn apply(self, store: &mut AssetStore, classifier: &AssetClassifier) -> usize {
        let version = self.version();
        let package_names: Vec<String> = self.assets.iter().map(|a| a.package_name.clone()).collect();
        let kinds: Vec<AssetKind> = self
            .assets
            .iter()
            .map(|record| {
                if version.has_dependencies() {
                    record.kind
                } else {
                    classifier.classify(&record.asset_class)
                }
            })
            .collect();

        store.reserve(self.assets.len());
        let count = self.assets.len();
        for (mut record, kind) in self.assets.into_iter().zip(kinds.iter().copied()) {
            record.kind = kind;
            store.add_path(&record.package_path.clone());
            match store.find_id(&record.object_path) {
                Some(id) => {
                    store.update(id, record);
                }
                None => {
                    store.add(record);
                }
            }
        }

        if !version.has_dependencies() {
            return count;
        }

        let mut seen = HashSet::new();
        for (index, block) in self.dependencies.iter().enumerate() {
            let package_name = &package_names[index];
            if !seen.insert(package_name.as_str()) {
                continue;
            }

            let (hard, soft) = if version.has_soft_dependencies() {
                (names_at(&package_names, &block.hard), names_at(&package_names, &block.soft))
            } else {
                // Older files kept a single list, map packages are still soft
                let (maps, others): (Vec<usize>, Vec<usize>) =
                    block.hard.iter().copied().partition(|&i| kinds[i] == AssetKind::Map);
                (names_at(&package_names, &others), names_at(&package_names, &maps))
            };

            let graph = store.graph_mut();
            if !hard.is_empty() || !soft.is_empty() {
                graph.set_dependencies(package_name, hard, soft);
            }
            if !block.referencers.is_empty() {
                graph.get_or_create(package_name);
                for &referencer in &block.referencers {
                    graph.get_or_create(&package_names[referencer]);
                }
            }
        }

        count
    }
}

fn names_at<'a>(package_names: &'a [String], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| package_names[i].as_str()).collect()
}

pub struct SnapshotReader<R: Read> {
    reader: R,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        SnapshotReader { reader }
    }

    pub fn read_snapshot(&mut self) -> Result<RegistrySnapshot> {
        let start = Instant::now();

        let first = self.reader.read_u32::<LittleEndian>()?;
        let (version, asset_count) = if first == REGISTRY_MAGIC {
            let version = SnapshotVersion::from_i32(self.reader.read_i32::<LittleEndian>()?)?;
            (Some(version), self.reader.read_count(MAX_ASSETS)?)
        } else {
            // No header, the first word is already the asset count
            let count = first as i32;
            if count < 0 || count as usize > MAX_ASSETS {
                return Err(RegistryError::InvalidArraySize(count));
            }
            debug!("snapshot has no header, reading legacy format");
            (None, count as usize)
        };
        let effective = version.unwrap_or(SnapshotVersion::PreVersioning);

        let mut assets = Vec::with_capacity(asset_count.min(4096));
        for _ in 0..asset_count {
            assets.push(self.read_asset(effective)?);
        }

        let mut dependencies = Vec::new();
        if effective.has_dependencies() {
            dependencies.reserve(asset_count.min(4096));
            for _ in 0..asset_count {
                dependencies.push(self.read_dependencies(effective, asset_count)?);
            }
        }

        info!(
            assets = asset_count,
            version = ?effective,
            seconds = start.elapsed().as_secs_f64(),
            "snapshot read"
        );
        Ok(RegistrySnapshot {
            version,
            assets,
            dependencies,
        })
    }

    fn read_asset(&mut self, version: SnapshotVersion) -> Result<AssetRecord> {
        let object_path = self.reader.read_fstring()?;
        let package_name = self.reader.read_fstring()?;
        let package_path = self.reader.read_fstring()?;
        let asset_name = self.reader.read_fstring()?;
        let asset_class = self.reader.read_fstring()?;

        let (kind, package_flags) = if version.has_dependencies() {
            let kind = AssetKind::from_u8(self.reader.read_u8()?)?;
            (kind, self.reader.read_u32::<LittleEndian>()?)
        } else {
            (AssetKind::Standard, 0)
        };

        let tags = self.reader.read_tarray(
            |r| {
                let key = r.read_fstring()?;
                let value = r.read_fstring()?;
                Ok((key, value))
            },
            MAX_TAGS,
        )?;
        let chunk_ids = self
            .reader
            .read_tarray(|r| Ok(r.read_i32::<LittleEndian>()?), MAX_CHUNK_IDS)?;

        Ok(AssetRecord {
            object_path,
            package_name,
            package_path,
            asset_name,
            asset_class,
            tags: tags.into_iter().collect(),
            chunk_ids,
            package_flags,
            kind,
        })
    }

    fn read_indices(&mut self, asset_count: usize) -> Result<Vec<usize>> {
        self.reader.read_tarray(
            |r| {
                let index = r.read_i32::<LittleEndian>()?;
                if index < 0 || index as usize >= asset_count {
                    return Err(RegistryError::InvalidAssetIndex {
                        index,
                        count: asset_count,
                    });
                }
                Ok(index as usize)
            },
            asset_count,
        )
    }

    fn read_dependencies(&mut self, version: SnapshotVersion, asset_count: usize) -> Result<SnapshotDependencies> {
        let hard = self.read_indices(asset_count)?;
        let soft = if version.has_soft_dependencies() {
            self.read_indices(asset_count)?
        } else {
            Vec::new()
        };
        let referencers = self.read_indices(asset_count)?;

        Ok(SnapshotDependencies {
            hard,
            soft,
            referencers,
        })
    }
}

/// Reads a snapshot from `reader` and merges it into `store`.
pub fn load_snapshot<R: Read>(
    reader: R,
    store: &mut AssetStore,
    classifier: &AssetClassifier,
) -> Result<SnapshotVersion> {
    let snapshot = SnapshotReader::new(reader).read_snapshot()?;
    let version = snapshot.version();
    snapshot.apply(store, classifier);
    Ok(version)
}

/// Writes the store in the latest format. Returns the number of records
/// written.
pub fn save_snapshot<W: Write>(store: &AssetStore, options: &SerializationOptions, writer: W) -> Result<usize> {
    save_snapshot_as(store, options, SnapshotVersion::LATEST, writer)
}

pub fn save_snapshot_as<W: Write>(
    store: &AssetStore,
    options: &SerializationOptions,
    version: SnapshotVersion,
    mut writer: W,
) -> Result<usize> {
    let start = Instant::now();

    let mut assets: Vec<&AssetRecord> = store.records().collect();
    assets.sort_by(|a, b| a.object_path.cmp(&b.object_path));

    if version != SnapshotVersion::PreVersioning {
        writer.write_u32::<LittleEndian>(REGISTRY_MAGIC)?;
        writer.write_i32::<LittleEndian>(version as i32)?;
    }
    writer.write_count(assets.len())?;

    for record in &assets {
        write_asset(&mut writer, record, options, version)?;
    }

    if version.has_dependencies() {
        let blocks = build_dependency_blocks(store, &assets);
        for block in &blocks {
            if version.has_soft_dependencies() {
                write_indices(&mut writer, &block.hard)?;
                write_indices(&mut writer, &block.soft)?;
            } else {
                let merged: BTreeSet<usize> = block.hard.iter().chain(&block.soft).copied().collect();
                write_indices(&mut writer, &merged.into_iter().collect::<Vec<_>>())?;
            }
            write_indices(&mut writer, &block.referencers)?;
        }
    }

    writer.flush()?;
    info!(
        assets = assets.len(),
        version = ?version,
        seconds = start.elapsed().as_secs_f64(),
        "snapshot written"
    );
    Ok(assets.len())
}

fn write_asset<W: Write>(
    writer: &mut W,
    record: &AssetRecord,
    options: &SerializationOptions,
    version: SnapshotVersion,
) -> Result<()> {
    writer.write_fstring(&record.object_path)?;
    writer.write_fstring(&record.package_name)?;
    writer.write_fstring(&record.package_path)?;
    writer.write_fstring(&record.asset_name)?;
    writer.write_fstring(&record.asset_class)?;

    if version.has_dependencies() {
        writer.write_u8(record.kind as u8)?;
        writer.write_u32::<LittleEndian>(record.package_flags)?;
    }

    let tags: Vec<(&String, &String)> = record
        .tags
        .iter()
        .filter(|(tag, _)| options.should_write_tag(&record.asset_class, tag))
        .collect();
    writer.write_tarray(&tags, |w, (key, value)| {
        w.write_fstring(key)?;
        w.write_fstring(value)
    })?;

    writer.write_tarray(&record.chunk_ids, |w, id| Ok(w.write_i32::<LittleEndian>(*id)?))
}

fn write_indices<W: Write>(writer: &mut W, indices: &[usize]) -> Result<()> {
    writer.write_tarray(indices, |w, index| w.write_count(*index))
}

/// Dependency blocks for `assets`, with every edge resolved through
/// redirectors. Edges whose target is not part of the snapshot are dropped
/// and edges to map packages are written as soft.
fn build_dependency_blocks(store: &AssetStore, assets: &[&AssetRecord]) -> Vec<SnapshotDependencies> {
    let mut first_index: HashMap<&str, usize> = HashMap::new();
    for (index, record) in assets.iter().enumerate() {
        first_index.entry(record.package_name.as_str()).or_insert(index);
    }

    let redirectors = store.redirector_packages();
    let maps = store.map_packages();
    let allowed: HashSet<String> = first_index
        .keys()
        .filter(|name| !redirectors.contains(**name))
        .map(|name| name.to_string())
        .collect();

    let graph = store.graph();
    let mut cache = HashMap::new();
    let mut blocks = vec![SnapshotDependencies::default(); assets.len()];

    for (index, record) in assets.iter().enumerate() {
        if first_index.get(record.package_name.as_str()) != Some(&index) {
            continue;
        }
        let Some(node) = graph.find(&record.package_name).and_then(|id| graph.node(id)) else {
            continue;
        };

        let mut hard = BTreeSet::new();
        let mut soft = BTreeSet::new();
        let mut link = |targets: &HashSet<_>, is_hard: bool| {
            for &target in targets {
                let resolved = graph.resolve_redirector(target, &allowed, &redirectors, &mut cache);
                let Some(name) = graph.package_name(resolved) else {
                    continue;
                };
                if name == record.package_name {
                    continue;
                }
                let Some(&target_index) = first_index.get(name) else {
                    continue;
                };
                if is_hard && !maps.contains(name) {
                    hard.insert(target_index);
                } else {
                    soft.insert(target_index);
                }
            }
        };
        link(node.hard_dependencies(), true);
        link(node.soft_dependencies(), false);

        let soft: Vec<usize> = soft.difference(&hard).copied().collect();
        blocks[index] = SnapshotDependencies {
            hard: hard.into_iter().collect(),
            soft,
            referencers: Vec::new(),
        };
    }

    // Referencers mirror the written edges, so they follow redirector resolution.
    for index in 0..blocks.len() {
        let targets: Vec<usize> = blocks[index].hard.iter().chain(&blocks[index].soft).copied().collect();
        for target in targets {
            blocks[target].referencers.push(index);
        }
    }

    blocks
}
