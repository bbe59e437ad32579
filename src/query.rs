//! Query/filter engine.
//!
//! Evaluates an [`AssetFilter`] against resident objects first and cached
//! records second. Cached candidates are gathered per filter dimension from
//! the store's indices and merge-intersected by object path, so the cost
//! follows the most selective dimension instead of the total asset count.

use crate::asset_data::AssetRecord;
use crate::asset_store::{AssetId, AssetStore};
use crate::errors::{RegistryError, Result};
use crate::filter::AssetFilter;
use crate::live::{LiveAsset, LiveObjects};
use crate::package_name::without_trailing_slash;
use std::collections::HashSet;
use std::time::Instant;
use tracing::trace;

/// A filter with recursive paths and classes already expanded.
#[derive(Debug)]
struct ExpandedFilter<'f> {
    package_names: HashSet<&'f str>,
    package_paths: HashSet<String>,
    object_paths: HashSet<&'f str>,
    class_names: HashSet<String>,
    source: &'f AssetFilter,
}

impl ExpandedFilter<'_> {
    fn accepts_live(&self, record: &AssetRecord) -> bool {
        if !self.package_names.is_empty() && !self.package_names.contains(record.package_name.as_str()) {
            return false;
        }
        if !self.object_paths.is_empty() && !self.object_paths.contains(record.object_path.as_str()) {
            return false;
        }
        if !self.package_paths.is_empty() && !self.package_paths.contains(&record.package_path) {
            return false;
        }
        if !self.source.tags_and_values.is_empty() && !self.source.matches_tags(|tag| record.tag(tag)) {
            return false;
        }
        true
    }
}

/// Keeps the elements of `a` that also appear in `b`. Both must be sorted
/// by object path.
fn merge_intersect<'s>(a: &[&'s AssetRecord], b: &[&'s AssetRecord]) -> Vec<&'s AssetRecord> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].object_path.cmp(&b[j].object_path) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

/// A read-only view that answers queries over one store and one live
/// object source.
pub struct AssetQuery<'a> {
    store: &'a AssetStore,
    live: &'a dyn LiveObjects,
    include_world_assets: bool,
}

impl<'a> AssetQuery<'a> {
    pub fn new(store: &'a AssetStore, live: &'a dyn LiveObjects, include_world_assets: bool) -> Self {
        Self {
            store,
            live,
            include_world_assets,
        }
    }

    fn expand<'f>(&self, filter: &'f AssetFilter) -> ExpandedFilter<'f> {
        let mut package_paths: HashSet<String> = filter
            .package_paths
            .iter()
            .map(|path| without_trailing_slash(path).to_string())
            .collect();
        if filter.recursive_paths {
            for path in &filter.package_paths {
                package_paths.extend(self.store.paths().sub_paths(path, true));
            }
        }

        let class_names = if filter.recursive_classes && !filter.class_names.is_empty() {
            self.store.inheritance_map().sub_classes(
                &filter.class_names,
                &filter.recursive_classes_exclusion_set,
                &self.live.classes(),
            )
        } else {
            filter.class_names.iter().cloned().collect()
        };

        ExpandedFilter {
            package_names: filter.package_names.iter().map(String::as_str).collect(),
            package_paths,
            object_paths: filter.object_paths.iter().map(String::as_str).collect(),
            class_names,
            source: filter,
        }
    }

    fn is_queryable(&self, asset: &LiveAsset) -> bool {
        if asset.package_contains_map && !self.include_world_assets {
            return false;
        }
        !asset.loaded_for_diffing
    }

    /// Runs the resident pass. Every queryable object's path lands in
    /// `shadowed` whether or not it matched, so cached copies never
    /// duplicate it.
    fn collect_live(
        &self,
        filter: &ExpandedFilter<'_>,
        shadowed: &mut HashSet<String>,
        out: &mut Vec<AssetRecord>,
    ) {
        let objects: Vec<LiveAsset> = if filter.class_names.is_empty() {
            self.live.assets()
        } else {
            filter
                .class_names
                .iter()
                .flat_map(|class| self.live.assets_of_class(class))
                .collect()
        };

        for asset in objects {
            if !self.is_queryable(&asset) {
                continue;
            }
            shadowed.insert(asset.record.object_path.clone());
            if filter.accepts_live(&asset.record) {
                out.push(asset.record);
            }
        }
    }

    fn records_of(&self, ids: impl IntoIterator<Item = AssetId>) -> impl Iterator<Item = &'a AssetRecord> {
        let store = self.store;
        ids.into_iter().filter_map(move |id| store.get(id))
    }

    /// One candidate list per non-empty dimension.
    fn disk_candidates(&self, filter: &ExpandedFilter<'_>) -> Vec<Vec<&'a AssetRecord>> {
        let mut sets = Vec::new();

        if !filter.package_names.is_empty() {
            sets.push(
                filter
                    .package_names
                    .iter()
                    .flat_map(|name| self.records_of(self.store.ids_in_package(name)))
                    .collect(),
            );
        }

        if !filter.package_paths.is_empty() {
            sets.push(
                filter
                    .package_paths
                    .iter()
                    .flat_map(|path| self.records_of(self.store.ids_in_path(path)))
                    .collect(),
            );
        }

        if !filter.class_names.is_empty() {
            sets.push(
                filter
                    .class_names
                    .iter()
                    .flat_map(|class| self.records_of(self.store.ids_of_class(class)))
                    .collect(),
            );
        }

        if !filter.object_paths.is_empty() {
            sets.push(
                filter
                    .object_paths
                    .iter()
                    .filter_map(|path| self.store.find(path))
                    .collect(),
            );
        }

        if !filter.source.tags_and_values.is_empty() {
            sets.push(
                filter
                    .source
                    .tags_and_values
                    .iter()
                    .flat_map(|(tag, value)| {
                        self.records_of(self.store.ids_with_tag(tag))
                            .filter(move |record| record.tag(tag) == Some(value.as_str()))
                    })
                    .collect(),
            );
        }

        sets
    }

    /// Returns every asset matching `filter`. Resident objects come first,
    /// followed by cached records that are neither shadowed nor in an empty
    /// package.
    pub fn get_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>> {
        let start = Instant::now();

        if !filter.is_valid() {
            return Err(RegistryError::InvalidFilter);
        }
        if filter.is_empty() {
            return Err(RegistryError::EmptyFilter);
        }

        let expanded = self.expand(filter);
        let mut results = Vec::new();
        let mut shadowed = HashSet::new();

        if !filter.include_only_on_disk_assets {
            self.collect_live(&expanded, &mut shadowed, &mut results);
        }

        let mut sets = self.disk_candidates(&expanded);
        for set in sets.iter_mut() {
            set.sort_by(|a, b| a.object_path.cmp(&b.object_path));
            set.dedup_by(|a, b| a.object_path == b.object_path);
        }

        let mut sets = sets.into_iter();
        let mut combined = sets.next().unwrap_or_default();
        for set in sets {
            if combined.is_empty() {
                break;
            }
            combined = merge_intersect(&combined, &set);
        }

        results.extend(
            combined
                .into_iter()
                .filter(|record| !self.store.is_package_empty(&record.package_name))
                .filter(|record| !shadowed.contains(&record.object_path))
                .cloned(),
        );

        trace!(
            count = results.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "get_assets completed"
        );
        Ok(results)
    }

    pub fn get_all_assets(&self, include_only_on_disk_assets: bool) -> Vec<AssetRecord> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut shadowed = HashSet::new();

        if !include_only_on_disk_assets {
            let everything = AssetFilter::new();
            self.collect_live(&self.expand(&everything), &mut shadowed, &mut results);
        }

        results.extend(
            self.store
                .records()
                .filter(|record| !self.store.is_package_empty(&record.package_name))
                .filter(|record| !shadowed.contains(&record.object_path))
                .cloned(),
        );

        trace!(
            count = results.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "get_all_assets completed"
        );
        results
    }

    /// The resident object wins over the cached record.
    pub fn get_asset_by_object_path(&self, object_path: &str) -> Option<AssetRecord> {
        if let Some(asset) = self.live.find_asset(object_path) {
            return Some(asset.record);
        }

        self.store
            .find(object_path)
            .filter(|record| !self.store.is_package_empty(&record.package_name))
            .cloned()
    }

    /// Removes from `assets` every entry that `filter` rejects. Recursive
    /// paths match the exact folder or any folder below it. An empty filter
    /// keeps everything.
    pub fn run_assets_through_filter(&self, assets: &mut Vec<AssetRecord>, filter: &AssetFilter) -> Result<()> {
        if !filter.is_valid() {
            return Err(RegistryError::InvalidFilter);
        }
        if filter.is_empty() {
            return Ok(());
        }

        let requested_classes: HashSet<String> = if filter.recursive_classes && !filter.class_names.is_empty() {
            self.store.inheritance_map().sub_classes(
                &filter.class_names,
                &filter.recursive_classes_exclusion_set,
                &self.live.classes(),
            )
        } else {
            filter.class_names.iter().cloned().collect()
        };

        let passes_path = |record: &AssetRecord| {
            filter.package_paths.iter().any(|path| {
                let path = without_trailing_slash(path);
                if filter.recursive_paths {
                    record
                        .package_path
                        .strip_prefix(path)
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
                } else {
                    record.package_path == path
                }
            })
        };

        assets.retain(|record| {
            (filter.package_names.is_empty() || filter.package_names.contains(&record.package_name))
                && (filter.package_paths.is_empty() || passes_path(record))
                && (filter.object_paths.is_empty() || filter.object_paths.contains(&record.object_path))
                && (requested_classes.is_empty() || requested_classes.contains(&record.asset_class))
                && (filter.tags_and_values.is_empty() || filter.matches_tags(|tag| record.tag(tag)))
        });
        Ok(())
    }
}
