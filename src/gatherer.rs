//! Boundary between the registry and the background scanner.
//!
//! The scanner runs on its own thread and appends to a result buffer; the
//! registry drains that buffer from its owning thread on every tick. Nothing
//! else crosses the thread boundary.

use crate::asset_data::{AssetRecord, PackageDependencyData};
use crate::package_name::without_trailing_slash;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the scanner produced since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatherResults {
    pub assets: Vec<AssetRecord>,
    pub paths: Vec<String>,
    pub dependencies: Vec<PackageDependencyData>,
    pub cooked_without_metadata: Vec<String>,
    /// Seconds spent on each finished search, for logging.
    pub search_times: Vec<f64>,
    pub files_remaining: usize,
    pub paths_remaining: usize,
    pub is_discovering: bool,
}

impl GatherResults {
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
            && self.paths.is_empty()
            && self.dependencies.is_empty()
            && self.cooked_without_metadata.is_empty()
    }
}

pub trait AssetGatherer: Send + Sync {
    /// Moves every buffered result out of the scanner.
    fn get_and_trim_results(&self) -> GatherResults;

    fn add_path_to_search(&self, path: &str);

    fn add_files_to_search(&self, files: &[PathBuf]);

    /// Moves `path` to the front of the search queue.
    fn prioritize_path(&self, path: &str);

    /// Blocks until the scanner has a complete result set for `paths`.
    fn scan_synchronous(&self, paths: &[String], use_cache: bool) -> GatherResults;
}

/// True if `package_name` (or folder) sits at or below `path`.
pub fn is_under_path(package_name: &str, path: &str) -> bool {
    let path = without_trailing_slash(path);
    package_name
        .strip_prefix(path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[derive(Debug, Default)]
struct QueuedGathererInner {
    results: GatherResults,
    search_paths: Vec<String>,
    search_files: Vec<PathBuf>,
    priority_path: Option<String>,
}

/// A gatherer fed by an external producer thread. Cloning yields another
/// handle to the same buffers, so the producer keeps one clone and hands
/// the other to the registry.
#[derive(Debug, Clone, Default)]
pub struct QueuedGatherer {
    inner: Arc<Mutex<QueuedGathererInner>>,
}

impl QueuedGatherer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_assets(&self, assets: impl IntoIterator<Item = AssetRecord>) {
        let mut inner = self.inner.lock();
        inner.results.assets.extend(assets);
        if let Some(path) = inner.priority_path.clone() {
            sort_by_priority(&mut inner.results.assets, &path);
        }
    }

    pub fn push_paths(&self, paths: impl IntoIterator<Item = String>) {
        self.inner.lock().results.paths.extend(paths);
    }

    pub fn push_dependencies(&self, dependencies: impl IntoIterator<Item = PackageDependencyData>) {
        self.inner.lock().results.dependencies.extend(dependencies);
    }

    pub fn push_cooked_without_metadata(&self, packages: impl IntoIterator<Item = String>) {
        self.inner.lock().results.cooked_without_metadata.extend(packages);
    }

    /// Updates the discovery status reported on the next drain.
    pub fn set_progress(&self, files_remaining: usize, paths_remaining: usize, is_discovering: bool) {
        let mut inner = self.inner.lock();
        inner.results.files_remaining = files_remaining;
        inner.results.paths_remaining = paths_remaining;
        inner.results.is_discovering = is_discovering;
    }

    /// Paths and files the registry asked the producer to search.
    pub fn take_search_requests(&self) -> (Vec<String>, Vec<PathBuf>) {
        let mut inner = self.inner.lock();
        (
            std::mem::take(&mut inner.search_paths),
            std::mem::take(&mut inner.search_files),
        )
    }

    pub fn priority_path(&self) -> Option<String> {
        self.inner.lock().priority_path.clone()
    }
}

fn sort_by_priority(assets: &mut [AssetRecord], path: &str) {
    // Stable, keeps production order inside both halves
    assets.sort_by_key(|asset| !is_under_path(&asset.package_name, path));
}

fn take_matching<T>(items: &mut Vec<T>, mut matches: impl FnMut(&T) -> bool) -> Vec<T> {
    let (taken, kept): (Vec<T>, Vec<T>) = std::mem::take(items).into_iter().partition(|item| matches(item));
    *items = kept;
    taken
}

impl AssetGatherer for QueuedGatherer {
    fn get_and_trim_results(&self) -> GatherResults {
        let mut inner = self.inner.lock();
        let files_remaining = inner.results.files_remaining;
        let paths_remaining = inner.results.paths_remaining;
        let is_discovering = inner.results.is_discovering;

        let mut results = std::mem::take(&mut inner.results);
        inner.results.files_remaining = files_remaining;
        inner.results.paths_remaining = paths_remaining;
        inner.results.is_discovering = is_discovering;

        results.files_remaining = files_remaining;
        results.paths_remaining = paths_remaining;
        results
    }

    fn add_path_to_search(&self, path: &str) {
        let mut inner = self.inner.lock();
        inner.search_paths.push(path.to_string());
        inner.results.is_discovering = true;
    }

    fn add_files_to_search(&self, files: &[PathBuf]) {
        let mut inner = self.inner.lock();
        inner.search_files.extend(files.iter().cloned());
        inner.results.is_discovering = true;
    }

    fn prioritize_path(&self, path: &str) {
        let mut inner = self.inner.lock();
        inner.priority_path = Some(path.to_string());
        sort_by_priority(&mut inner.results.assets, path);
    }

    /// Hands back whatever the producer already buffered below `paths`. The
    /// rest stays queued for the regular drain.
    fn scan_synchronous(&self, paths: &[String], _use_cache: bool) -> GatherResults {
        let mut inner = self.inner.lock();
        let under = |name: &str| paths.iter().any(|path| is_under_path(name, path));

        GatherResults {
            assets: take_matching(&mut inner.results.assets, |a| under(&a.package_name)),
            paths: take_matching(&mut inner.results.paths, |p| under(p)),
            dependencies: take_matching(&mut inner.results.dependencies, |d| under(&d.package_name)),
            cooked_without_metadata: take_matching(&mut inner.results.cooked_without_metadata, |p| under(p)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_containment_respects_folder_boundaries() {
        assert!(is_under_path("/Game/Props/Crate", "/Game/Props"));
        assert!(is_under_path("/Game/Props", "/Game/Props/"));
        assert!(!is_under_path("/Game/PropsExtra/Crate", "/Game/Props"));
    }

    #[test]
    fn drain_keeps_discovery_status() {
        let gatherer = QueuedGatherer::new();
        gatherer.push_assets([AssetRecord::new("/Game/A", "A", "Texture2D")]);
        gatherer.set_progress(5, 1, true);

        let first = gatherer.get_and_trim_results();
        assert_eq!(first.assets.len(), 1);
        assert_eq!(first.files_remaining, 5);
        assert!(first.is_discovering);

        let second = gatherer.get_and_trim_results();
        assert!(second.is_empty());
        assert!(second.is_discovering);
    }

    #[test]
    fn prioritized_assets_move_to_front() {
        let gatherer = QueuedGatherer::new();
        gatherer.push_assets([
            AssetRecord::new("/Game/A/One", "One", "Texture2D"),
            AssetRecord::new("/Game/B/Two", "Two", "Texture2D"),
            AssetRecord::new("/Game/A/Three", "Three", "Texture2D"),
        ]);
        gatherer.prioritize_path("/Game/B");
        gatherer.push_assets([AssetRecord::new("/Game/B/Four", "Four", "Texture2D")]);

        let names: Vec<_> = gatherer
            .get_and_trim_results()
            .assets
            .into_iter()
            .map(|a| a.asset_name)
            .collect();
        assert_eq!(names, vec!["Two", "Four", "One", "Three"]);
    }

    #[test]
    fn synchronous_scan_takes_only_requested_paths() {
        let gatherer = QueuedGatherer::new();
        gatherer.push_assets([
            AssetRecord::new("/Game/A/One", "One", "Texture2D"),
            AssetRecord::new("/Game/B/Two", "Two", "Texture2D"),
        ]);
        gatherer.push_paths(["/Game/A".to_string(), "/Game/B".to_string()]);

        let scanned = gatherer.scan_synchronous(&["/Game/A".to_string()], true);
        assert_eq!(scanned.assets.len(), 1);
        assert_eq!(scanned.paths, vec!["/Game/A"]);

        let rest = gatherer.get_and_trim_results();
        assert_eq!(rest.assets[0].asset_name, "Two");
    }
}
