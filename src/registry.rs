//! The registry context.
//!
//! [`AssetRegistry`] ties the store, the ingestion pipeline and the query
//! engine together and talks to the host's collaborators: the scanner, the
//! directory watcher and the live object system. It is owned by one thread;
//! the scanner and the watcher only ever append to thread-safe buffers that
//! [`AssetRegistry::tick`] drains.

use crate::asset_data::AssetRecord;
use crate::asset_store::AssetStore;
use crate::config::RegistryConfig;
use crate::depends::DependencyQuery;
use crate::errors::Result;
use crate::events::{Notifier, RegistryEvent, SubscriptionId};
use crate::filter::AssetFilter;
use crate::gatherer::AssetGatherer;
use crate::live::{LiveAsset, LiveObjects, NoLiveObjects};
use crate::package_name::{
    is_package_extension, object_path_to_package_name, without_trailing_slash, MountPoint, MountTable,
};
use crate::pipeline::{IngestPipeline, IngestState, TickBudget, TickReport};
use crate::query::AssetQuery;
use crate::serialization::{load_snapshot, save_snapshot};
use crate::versions::SnapshotVersion;
use crate::watcher::{
    collapse_file_changes, DirectoryChangedCallback, DirectoryWatcher, FileAction, FileChange, WatchHandle,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct AssetRegistry {
    config: RegistryConfig,
    store: AssetStore,
    pipeline: IngestPipeline,
    notifier: Notifier,
    live: Arc<dyn LiveObjects>,
    gatherer: Option<Arc<dyn AssetGatherer>>,
    watcher: Option<Arc<dyn DirectoryWatcher>>,
    mounts: MountTable,
    watch_handles: HashMap<PathBuf, WatchHandle>,
    pending_changes: Arc<Mutex<Vec<FileChange>>>,
    synchronously_scanned: HashSet<String>,
    background_search_started: bool,
    initialized: bool,
}

impl std::fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRegistry")
            .field("assets", &self.store.len())
            .field("state", &self.pipeline.state())
            .field("mounts", &self.mounts)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl AssetRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let pipeline = IngestPipeline::new(config.classifier());
        let mounts = MountTable::new(config.mount_points.iter().cloned());

        AssetRegistry {
            config,
            store: AssetStore::new(),
            pipeline,
            notifier: Notifier::new(),
            live: Arc::new(NoLiveObjects),
            gatherer: None,
            watcher: None,
            mounts,
            watch_handles: HashMap::new(),
            pending_changes: Arc::new(Mutex::new(Vec::new())),
            synchronously_scanned: HashSet::new(),
            background_search_started: false,
            initialized: false,
        }
    }

    pub fn with_live_objects(mut self, live: Arc<dyn LiveObjects>) -> Self {
        self.live = live;
        self
    }

    pub fn with_gatherer(mut self, gatherer: Arc<dyn AssetGatherer>) -> Self {
        self.gatherer = Some(gatherer);
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn DirectoryWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn state(&self) -> IngestState {
        self.pipeline.state()
    }

    /// Loads the configured snapshot, starts watching the mounted content
    /// folders and, if configured, kicks off the background search.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let start = Instant::now();

        if let Some(path) = self.config.snapshot_path.clone() {
            if path.exists() {
                self.load_snapshot_file(&path)?;
            } else {
                debug!(path = %path.display(), "no snapshot to preload");
            }
        }

        if self.config.watch_directories {
            let roots: Vec<PathBuf> = self.mounts.iter().map(|m| m.filesystem_path.clone()).collect();
            for root in roots {
                self.watch_directory(&root);
            }
        }

        if self.config.search_on_init {
            self.search_all_assets(false);
        }

        self.initialized = true;
        info!(
            seconds = start.elapsed().as_secs_f64(),
            assets = self.store.len(),
            "asset registry startup"
        );
        Ok(())
    }

    /// Releases every record and node. Returns false if the dependency node
    /// accounting did not balance.
    pub fn shutdown(&mut self) -> bool {
        let handles: Vec<(PathBuf, WatchHandle)> = self.watch_handles.drain().collect();
        if let Some(watcher) = &self.watcher {
            for (directory, handle) in handles {
                watcher.unregister_directory_changed(&directory, handle);
            }
        }

        self.pending_changes.lock().clear();
        self.notifier.clear();
        self.initialized = false;
        self.store.clear()
    }

    fn dispatch_events(&mut self) {
        for event in self.store.take_events() {
            self.notifier.broadcast(&event);
        }
    }

    fn watch_directory(&mut self, directory: &Path) {
        let Some(watcher) = self.watcher.clone() else {
            debug!(directory = %directory.display(), "no directory watcher, change notifications disabled");
            return;
        };

        if let Err(err) = fs::create_dir_all(directory) {
            warn!(directory = %directory.display(), error = %err, "could not create content directory");
        }

        let buffer = Arc::clone(&self.pending_changes);
        let callback: DirectoryChangedCallback = Box::new(move |changes: &[FileChange]| {
            buffer.lock().extend_from_slice(changes);
        });

        match watcher.register_directory_changed(directory, callback) {
            Some(handle) => {
                self.watch_handles.insert(directory.to_path_buf(), handle);
            }
            None => warn!(directory = %directory.display(), "directory watch registration failed"),
        }
    }

    fn unwatch_directory(&mut self, directory: &Path) {
        let Some(handle) = self.watch_handles.remove(directory) else {
            return;
        };
        if let Some(watcher) = &self.watcher {
            watcher.unregister_directory_changed(directory, handle);
        }
    }

    /// Per-frame update: applies buffered file changes, then merges scanner
    /// results within the configured budget.
    pub fn tick(&mut self) -> TickReport {
        let changes = std::mem::take(&mut *self.pending_changes.lock());
        if !changes.is_empty() {
            self.on_directory_changed(&changes);
        }

        let budget = TickBudget::new(self.config.max_seconds_per_tick, self.config.max_results_per_tick);
        let report = self
            .pipeline
            .tick(&mut self.store, self.gatherer.as_deref(), budget);
        self.dispatch_events();
        report
    }

    pub fn search_all_assets(&mut self, synchronous: bool) {
        let paths = self.mounts.root_asset_paths();

        if synchronous {
            self.scan_paths_internal(&paths, false, self.config.use_scan_cache);
            return;
        }

        if self.background_search_started {
            return;
        }
        let Some(gatherer) = &self.gatherer else {
            debug!("no gatherer, background search skipped");
            return;
        };

        self.pipeline.restart_search_clock();
        for path in &paths {
            gatherer.add_path_to_search(path);
        }
        self.background_search_started = true;
    }

    /// Scans `paths` and merges the results before returning. Paths already
    /// scanned this way are skipped unless `force_rescan` is set.
    pub fn scan_paths_synchronous(&mut self, paths: &[String], force_rescan: bool) -> usize {
        self.scan_paths_internal(paths, force_rescan, false)
    }

    fn scan_paths_internal(&mut self, paths: &[String], force_rescan: bool, use_cache: bool) -> usize {
        let start = Instant::now();

        let to_scan: Vec<String> = paths
            .iter()
            .filter(|path| force_rescan || !self.synchronously_scanned.contains(*path))
            .cloned()
            .collect();
        if to_scan.is_empty() {
            return 0;
        }
        self.synchronously_scanned.extend(to_scan.iter().cloned());

        let Some(gatherer) = self.gatherer.clone() else {
            debug!("no gatherer, synchronous scan skipped");
            return 0;
        };

        let results = gatherer.scan_synchronous(&to_scan, use_cache);
        let found = self.pipeline.process_now(&mut self.store, results);
        self.dispatch_events();

        info!(
            first_path = %to_scan[0],
            paths = to_scan.len(),
            assets = found,
            seconds = start.elapsed().as_secs_f64(),
            "synchronous scan completed"
        );
        found
    }

    pub fn prioritize_search_path(&mut self, path: &str) {
        if let Some(gatherer) = &self.gatherer {
            gatherer.prioritize_path(path);
        }
        self.pipeline.prioritize(path);
    }

    fn query(&self) -> AssetQuery<'_> {
        AssetQuery::new(&self.store, self.live.as_ref(), self.config.use_world_assets)
    }

    pub fn get_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>> {
        self.query().get_assets(filter)
    }

    pub fn get_assets_by_package_name(&self, package_name: &str) -> Result<Vec<AssetRecord>> {
        self.get_assets(&AssetFilter::new().package_name(package_name))
    }

    pub fn get_assets_by_path(&self, package_path: &str, recursive: bool) -> Result<Vec<AssetRecord>> {
        self.get_assets(&AssetFilter::new().package_path(package_path).recursive_paths(recursive))
    }

    pub fn get_assets_by_class(&self, class_name: &str, search_sub_classes: bool) -> Result<Vec<AssetRecord>> {
        self.get_assets(&AssetFilter::new().class_name(class_name).recursive_classes(search_sub_classes))
    }

    pub fn get_assets_by_tag_values(&self, tags_and_values: &[(&str, &str)]) -> Result<Vec<AssetRecord>> {
        let filter = tags_and_values
            .iter()
            .fold(AssetFilter::new(), |filter, (tag, value)| filter.tag(tag, value));
        self.get_assets(&filter)
    }

    pub fn get_asset_by_object_path(&self, object_path: &str) -> Option<AssetRecord> {
        self.query().get_asset_by_object_path(object_path)
    }

    pub fn get_all_assets(&self, include_only_on_disk_assets: bool) -> Vec<AssetRecord> {
        self.query().get_all_assets(include_only_on_disk_assets)
    }

    pub fn run_assets_through_filter(&self, assets: &mut Vec<AssetRecord>, filter: &AssetFilter) -> Result<()> {
        self.query().run_assets_through_filter(assets, filter)
    }

    /// Packages `package_name` depends on, sorted. Empty for unknown packages.
    pub fn get_dependencies(&self, package_name: &str, query: DependencyQuery) -> Vec<String> {
        self.store
            .graph()
            .get_dependencies(package_name, query)
            .unwrap_or_default()
    }

    pub fn get_referencers(&self, package_name: &str, query: DependencyQuery) -> Vec<String> {
        self.store
            .graph()
            .get_referencers(package_name, query)
            .unwrap_or_default()
    }

    pub fn get_ancestor_class_names(&self, class_name: &str) -> Option<Vec<String>> {
        self.store
            .inheritance_map()
            .ancestors(class_name, &self.live.classes())
    }

    pub fn get_derived_class_names(&self, class_names: &[String], excluded: &HashSet<String>) -> HashSet<String> {
        self.store
            .inheritance_map()
            .sub_classes(class_names, excluded, &self.live.classes())
    }

    pub fn get_all_cached_paths(&self) -> Vec<String> {
        self.store.paths().all_paths()
    }

    pub fn get_sub_paths(&self, base_path: &str, recurse: bool) -> Vec<String> {
        self.store.paths().sub_paths(base_path, recurse)
    }

    pub fn add_path(&mut self, path: &str) -> bool {
        let added = self.store.add_path(path);
        self.dispatch_events();
        added
    }

    /// Removes a folder and its subfolders. Without `force` this fails
    /// while any asset, cached or resident, still lives below it.
    pub fn remove_path(&mut self, path: &str, force: bool) -> bool {
        if !force {
            let occupied = self
                .get_assets_by_path(path, true)
                .map(|assets| !assets.is_empty())
                .unwrap_or(true);
            if occupied {
                return false;
            }
        }

        let removed = self.store.remove_path(path, true);
        self.dispatch_events();
        removed
    }

    /// A new asset was created in memory.
    pub fn asset_created(&mut self, asset: &LiveAsset) {
        let record = &asset.record;
        self.store.unmark_package_empty(&record.package_name);
        self.store.add_path(&record.package_path);

        self.store.push_event(RegistryEvent::AssetAdded(record.clone()));
        self.store
            .push_event(RegistryEvent::InMemoryAssetCreated(record.clone()));
        self.dispatch_events();
    }

    /// An in-memory asset was deleted. `package_now_empty` is true when it
    /// was the last asset of its package, which then hides the package's
    /// cached records until it is removed from disk or refilled.
    pub fn asset_deleted(&mut self, asset: &LiveAsset, package_now_empty: bool) {
        let record = &asset.record;
        if package_now_empty {
            self.store.mark_package_empty(&record.package_name);
        }

        self.store.push_event(RegistryEvent::AssetRemoved(record.clone()));
        self.store
            .push_event(RegistryEvent::InMemoryAssetDeleted(record.clone()));
        self.dispatch_events();
    }

    /// An in-memory asset moved from `old_object_path` to its current path.
    pub fn asset_renamed(&mut self, asset: &LiveAsset, old_object_path: &str, old_package_now_empty: bool) {
        let mut record = asset.record.clone();
        self.pipeline.classifier().apply(&mut record);

        self.store.unmark_package_empty(&record.package_name);
        if old_package_now_empty {
            self.store
                .mark_package_empty(object_path_to_package_name(old_object_path));
        }
        self.store.add_path(&record.package_path);

        if let Some(old_id) = self.store.find_id(old_object_path) {
            if self.store.find_id(&record.object_path).is_some() {
                self.store.remove(old_object_path);
            } else {
                let old_package = self.store.get(old_id).map(|old| old.package_name.clone());
                self.store.update(old_id, record.clone());
                if let Some(old_package) = old_package {
                    self.move_package_node(&old_package, &record.package_name);
                }
            }
        }

        self.store.push_event(RegistryEvent::AssetRenamed {
            asset: record,
            old_object_path: old_object_path.to_string(),
        });
        self.dispatch_events();
    }

    /// Re-keys the dependency node once its last cached asset has left the
    /// old package.
    fn move_package_node(&mut self, old_package: &str, new_package: &str) {
        if old_package == new_package || !self.store.ids_in_package(old_package).is_empty() {
            return;
        }
        let graph = self.store.graph_mut();
        if !graph.rename(old_package, new_package) && graph.remove(old_package) {
            debug!(old_package, new_package, "renamed package already had dependencies, old node dropped");
        }
    }

    pub fn on_content_path_mounted(&mut self, asset_path: &str, filesystem_path: &Path) {
        let mount = MountPoint::new(asset_path, filesystem_path);
        info!(asset_path = %mount.asset_path, filesystem_path = %filesystem_path.display(), "content path mounted");

        match &self.gatherer {
            Some(gatherer) => gatherer.add_path_to_search(&mount.asset_path),
            None => debug!("no gatherer, mounted path will not be searched"),
        }
        self.mounts.insert(mount);

        if self.config.watch_directories {
            self.watch_directory(filesystem_path);
        }
    }

    pub fn on_content_path_dismounted(&mut self, asset_path: &str, filesystem_path: &Path) {
        let root = without_trailing_slash(asset_path).to_string();
        info!(asset_path = %root, "content path dismounted");

        let mut folders = self.store.paths().sub_paths(&root, true);
        folders.push(root.clone());

        let mut object_paths: Vec<String> = folders
            .iter()
            .flat_map(|folder| self.store.ids_in_path(folder))
            .filter_map(|id| self.store.get(id).map(|r| r.object_path.clone()))
            .collect();
        object_paths.sort();
        for object_path in &object_paths {
            self.store.remove(object_path);
        }

        self.store.remove_path(&root, true);
        self.mounts.remove(asset_path);
        self.unwatch_directory(filesystem_path);
        self.dispatch_events();
    }

    /// Applies a batch of file notifications. New or changed package files
    /// are queued for scanning; deleted ones drop their cached records.
    pub fn on_directory_changed(&mut self, changes: &[FileChange]) {
        let mut files_to_search: Vec<PathBuf> = Vec::new();

        for change in collapse_file_changes(changes) {
            let is_package_file = change
                .filename
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(is_package_extension);
            if !is_package_file {
                continue;
            }
            let Some(package_name) = self.mounts.try_convert_filename_to_long_package_name(&change.filename) else {
                continue;
            };

            match change.action {
                FileAction::Added | FileAction::Modified => {
                    debug!(file = %change.filename.display(), action = ?change.action, "package file changed");
                    if !files_to_search.contains(&change.filename) {
                        files_to_search.push(change.filename);
                    }
                }
                FileAction::Removed => {
                    debug!(file = %change.filename.display(), "package file removed");
                    self.store.remove_package(&package_name);
                    self.store.unmark_package_empty(&package_name);
                }
            }
        }

        if !files_to_search.is_empty() {
            match &self.gatherer {
                Some(gatherer) => gatherer.add_files_to_search(&files_to_search),
                None => debug!(files = files_to_search.len(), "no gatherer, changed files not rescanned"),
            }
        }
        self.dispatch_events();
    }

    pub fn is_loading_assets(&self) -> bool {
        self.pipeline.is_loading()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RegistryEvent) + Send + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Cooked packages that shipped without metadata and must be loaded to
    /// be indexed.
    pub fn take_packages_requiring_load(&mut self) -> Vec<String> {
        self.pipeline.take_packages_requiring_load()
    }

    pub fn serialize<W: Write>(&self, writer: W) -> Result<usize> {
        save_snapshot(&self.store, &self.config.serialization, writer)
    }

    pub fn deserialize<R: Read>(&mut self, reader: R) -> Result<SnapshotVersion> {
        let version = load_snapshot(reader, &mut self.store, self.pipeline.classifier())?;
        self.dispatch_events();
        Ok(version)
    }

    pub fn save_snapshot_file(&self, path: &Path) -> Result<usize> {
        let file = File::create(path)?;
        let written = self.serialize(BufWriter::new(file))?;
        info!(path = %path.display(), assets = written, "snapshot saved");
        Ok(written)
    }

    pub fn load_snapshot_file(&mut self, path: &Path) -> Result<SnapshotVersion> {
        let file = File::open(path)?;
        let version = self.deserialize(BufReader::new(file))?;
        info!(
            path = %path.display(),
            assets = self.store.len(),
            packages = self.store.package_count(),
            "snapshot loaded"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatherer::QueuedGatherer;
    use crate::live::LoadedObjects;

    fn registry_with(gatherer: &QueuedGatherer) -> AssetRegistry {
        let config = RegistryConfig {
            watch_directories: false,
            ..Default::default()
        };
        AssetRegistry::new(config).with_gatherer(Arc::new(gatherer.clone()))
    }

    #[test]
    fn background_search_requests_every_mount() {
        let gatherer = QueuedGatherer::new();
        let mut registry = registry_with(&gatherer);
        registry.on_content_path_mounted("/Plugin", Path::new("Plugins/Foo/Content"));
        registry.search_all_assets(false);
        registry.search_all_assets(false);

        let (paths, _) = gatherer.take_search_requests();
        assert_eq!(paths, vec!["/Plugin/", "/Game/", "/Plugin/"]);
    }

    #[test]
    fn synchronous_scans_skip_known_paths() {
        let gatherer = QueuedGatherer::new();
        let mut registry = registry_with(&gatherer);

        gatherer.push_assets([AssetRecord::new("/Game/A/One", "One", "Texture2D")]);
        assert_eq!(registry.scan_paths_synchronous(&["/Game/A".to_string()], false), 1);

        gatherer.push_assets([AssetRecord::new("/Game/A/Two", "Two", "Texture2D")]);
        assert_eq!(registry.scan_paths_synchronous(&["/Game/A".to_string()], false), 0);
        assert_eq!(registry.scan_paths_synchronous(&["/Game/A".to_string()], true), 1);
        assert_eq!(registry.store().len(), 2);
    }

    #[test]
    fn directory_changes_rescan_and_remove_packages() {
        let gatherer = QueuedGatherer::new();
        let mut registry = registry_with(&gatherer);
        gatherer.push_assets([AssetRecord::new("/Game/Props/Crate", "Crate", "StaticMesh")]);
        registry.tick();
        assert_eq!(registry.store().len(), 1);

        registry.on_directory_changed(&[
            FileChange::new("Content/Props/Crate.uasset", FileAction::Removed),
            FileChange::new("Content/Props/Barrel.uasset", FileAction::Added),
            FileChange::new("Content/Props/Notes.txt", FileAction::Added),
        ]);

        assert!(registry.store().is_empty());
        let (_, files) = gatherer.take_search_requests();
        assert_eq!(files, vec![PathBuf::from("Content/Props/Barrel.uasset")]);
    }

    #[test]
    fn dismount_removes_everything_below_the_root() {
        let gatherer = QueuedGatherer::new();
        let mut registry = registry_with(&gatherer);
        registry.on_content_path_mounted("/Plugin/", Path::new("Plugins/Foo/Content"));
        gatherer.push_assets([
            AssetRecord::new("/Plugin/Meshes/Rock", "Rock", "StaticMesh"),
            AssetRecord::new("/Plugin/Rock2", "Rock2", "StaticMesh"),
            AssetRecord::new("/Game/Crate", "Crate", "StaticMesh"),
        ]);
        registry.tick();

        registry.on_content_path_dismounted("/Plugin/", Path::new("Plugins/Foo/Content"));
        assert_eq!(registry.store().len(), 1);
        assert!(registry.get_sub_paths("/Plugin", true).is_empty());
        assert!(!registry.get_all_cached_paths().contains(&"/Plugin".to_string()));
        assert_eq!(registry.mounts().root_asset_paths(), vec!["/Game/"]);
    }

    #[test]
    fn remove_path_counts_resident_assets() {
        let live = Arc::new(LoadedObjects::new());
        let mut registry = AssetRegistry::new(RegistryConfig::default()).with_live_objects(live.clone());
        registry.add_path("/Game/Scratch");
        live.insert_asset(LiveAsset::new(AssetRecord::new("/Game/Scratch/Temp", "Temp", "Material")));

        assert!(!registry.remove_path("/Game/Scratch", false));
        live.remove_asset("/Game/Scratch/Temp.Temp");
        assert!(registry.remove_path("/Game/Scratch", false));
    }

    #[test]
    fn in_memory_events_reach_subscribers() {
        let mut registry = AssetRegistry::new(RegistryConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe(move |event| sink.lock().push(event.clone()));

        let asset = LiveAsset::new(AssetRecord::new("/Game/New/Thing", "Thing", "Material"));
        registry.asset_created(&asset);

        let events = seen.lock();
        assert!(matches!(events[0], RegistryEvent::PathAdded(ref p) if p == "/Game/New"));
        assert!(matches!(events[1], RegistryEvent::AssetAdded(_)));
        assert!(matches!(events[2], RegistryEvent::InMemoryAssetCreated(_)));
    }
}
