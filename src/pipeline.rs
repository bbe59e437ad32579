//! Ingestion pipeline.
//!
//! Results produced by the scanner are queued here and merged into the
//! store a slice at a time. Within a tick paths are processed before assets
//! so an asset's folder always exists when the asset is indexed, then
//! dependency batches, then cooked packages that shipped without metadata.

use crate::asset_data::{AssetClassifier, AssetRecord, PackageDependencyData};
use crate::asset_store::AssetStore;
use crate::events::{LoadProgress, RegistryEvent};
use crate::gatherer::{is_under_path, AssetGatherer, GatherResults};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestState {
    #[default]
    Idle,
    Discovering,
    Draining,
}

/// How much work one tick may do. Every result kind processes at least one
/// entry per tick; the item limit applies to each kind separately.
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    start: Instant,
    max_seconds: Option<f64>,
    max_items: Option<usize>,
}

impl TickBudget {
    pub fn new(max_seconds: f64, max_items: Option<usize>) -> Self {
        Self {
            start: Instant::now(),
            max_seconds: (max_seconds > 0.0).then_some(max_seconds),
            max_items,
        }
    }

    /// Drains everything in one pass.
    pub fn flush() -> Self {
        Self {
            start: Instant::now(),
            max_seconds: None,
            max_items: None,
        }
    }

    fn exhausted(&self, processed: usize) -> bool {
        if self.max_items.is_some_and(|max| processed >= max) {
            return true;
        }
        self.max_seconds
            .is_some_and(|max| self.start.elapsed().as_secs_f64() > max)
    }
}

/// Pops entries off the front of `queue` until it is empty or the budget
/// runs out.
fn drain_queue<T>(queue: &mut VecDeque<T>, budget: &TickBudget, mut process: impl FnMut(T)) -> usize {
    let mut processed = 0;
    while let Some(item) = queue.pop_front() {
        process(item);
        processed += 1;
        if budget.exhausted(processed) {
            break;
        }
    }
    processed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub paths: usize,
    pub assets: usize,
    pub dependencies: usize,
    pub cooked_packages: usize,
    pub load_completed: bool,
}

pub fn ingest_path(store: &mut AssetStore, path: &str) {
    store.add_path(path);
}

/// Adds a scanned record or refreshes the cached copy with the same
/// object path.
pub fn ingest_asset(store: &mut AssetStore, classifier: &AssetClassifier, mut record: AssetRecord) {
    classifier.apply(&mut record);
    store.add_path(&record.package_path.clone());

    match store.find_id(&record.object_path) {
        Some(id) => {
            if store.get(id) != Some(&record) {
                store.update(id, record);
            }
        }
        None => {
            store.add(record);
        }
    }
}

/// Rebuilds the dependency node of one package. Imports are hard edges
/// except imports of map packages, string references are soft edges.
pub fn ingest_dependencies(store: &mut AssetStore, data: &PackageDependencyData) {
    let (soft_imports, hard): (Vec<&String>, Vec<&String>) = data
        .imports
        .iter()
        .partition(|import| store.is_map_package(import));

    let soft: Vec<&str> = soft_imports
        .into_iter()
        .map(String::as_str)
        .chain(data.soft_reference_packages())
        .collect();

    store
        .graph_mut()
        .set_dependencies(&data.package_name, hard, soft);
}

#[derive(Debug)]
pub struct IngestPipeline {
    assets: VecDeque<AssetRecord>,
    paths: VecDeque<String>,
    dependencies: VecDeque<PackageDependencyData>,
    cooked_without_metadata: VecDeque<String>,
    packages_requiring_load: Vec<String>,
    classifier: AssetClassifier,
    state: IngestState,
    files_remaining: usize,
    initial_search_completed: bool,
    full_search_start: Instant,
    amortize_start: Option<Instant>,
    total_amortize: Duration,
}

impl IngestPipeline {
    pub fn new(classifier: AssetClassifier) -> Self {
        Self {
            assets: VecDeque::new(),
            paths: VecDeque::new(),
            dependencies: VecDeque::new(),
            cooked_without_metadata: VecDeque::new(),
            packages_requiring_load: Vec::new(),
            classifier,
            state: IngestState::Idle,
            files_remaining: 0,
            initial_search_completed: false,
            full_search_start: Instant::now(),
            amortize_start: None,
            total_amortize: Duration::ZERO,
        }
    }

    pub fn classifier(&self) -> &AssetClassifier {
        &self.classifier
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// True until the first discovery pass has been fully merged.
    pub fn is_loading(&self) -> bool {
        !self.initial_search_completed
    }

    pub fn restart_search_clock(&mut self) {
        self.full_search_start = Instant::now();
    }

    pub fn pending_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn has_pending_results(&self) -> bool {
        !self.assets.is_empty()
            || !self.paths.is_empty()
            || !self.dependencies.is_empty()
            || !self.cooked_without_metadata.is_empty()
    }

    pub fn enqueue(&mut self, results: GatherResults) {
        for seconds in &results.search_times {
            debug!(seconds, "background search completed");
        }
        self.assets.extend(results.assets);
        self.paths.extend(results.paths);
        self.dependencies.extend(results.dependencies);
        self.cooked_without_metadata
            .extend(results.cooked_without_metadata);
        self.files_remaining = results.files_remaining;
    }

    /// Moves queued assets under `path` to the front, keeping their order.
    pub fn prioritize(&mut self, path: &str) {
        self.assets
            .make_contiguous()
            .sort_by_key(|asset| !is_under_path(&asset.package_path, path));
    }

    pub fn take_packages_requiring_load(&mut self) -> Vec<String> {
        std::mem::take(&mut self.packages_requiring_load)
    }

    /// Pulls new results from the gatherer and merges as much as `budget`
    /// allows into `store`.
    pub fn tick(
        &mut self,
        store: &mut AssetStore,
        gatherer: Option<&dyn AssetGatherer>,
        budget: TickBudget,
    ) -> TickReport {
        let mut report = TickReport::default();
        let mut is_searching = false;
        let mut paths_remaining = 0;

        if let Some(gatherer) = gatherer {
            let results = gatherer.get_and_trim_results();
            is_searching = results.is_discovering;
            paths_remaining = results.paths_remaining;
            self.enqueue(results);
        }

        report.paths = drain_queue(&mut self.paths, &budget, |path| ingest_path(store, &path));

        if !self.assets.is_empty() {
            let amortize_start = *self.amortize_start.get_or_insert_with(Instant::now);

            let classifier = &self.classifier;
            report.assets = drain_queue(&mut self.assets, &budget, |record| {
                ingest_asset(store, classifier, record)
            });

            if self.assets.is_empty() {
                self.total_amortize += amortize_start.elapsed();
                self.amortize_start = None;
            }

            let discovered_assets = store.len();
            store.push_event(RegistryEvent::FileLoadProgress(LoadProgress {
                discovered_assets,
                total_assets: discovered_assets + self.assets.len() + self.files_remaining,
                pending_results: self.assets.len(),
                is_discovering: is_searching,
            }));
        }

        report.dependencies = drain_queue(&mut self.dependencies, &budget, |data| {
            ingest_dependencies(store, &data)
        });

        let requiring_load = &mut self.packages_requiring_load;
        report.cooked_packages = drain_queue(&mut self.cooked_without_metadata, &budget, |package| {
            requiring_load.push(package)
        });

        let discovering = is_searching || self.files_remaining > 0 || paths_remaining > 0;
        self.state = if discovering {
            IngestState::Discovering
        } else if self.has_pending_results() {
            IngestState::Draining
        } else {
            IngestState::Idle
        };

        if self.state == IngestState::Idle && !self.initial_search_completed {
            self.initial_search_completed = true;
            report.load_completed = true;
            debug!(
                seconds = self.total_amortize.as_secs_f64(),
                "time spent amortizing search results"
            );
            info!(
                seconds = self.full_search_start.elapsed().as_secs_f64(),
                assets = store.len(),
                "asset discovery search completed"
            );
            store.push_event(RegistryEvent::FileLoadComplete);
        }

        report
    }

    /// Merges a complete result set immediately, bypassing the queues.
    /// Returns the number of asset records processed.
    pub fn process_now(&mut self, store: &mut AssetStore, results: GatherResults) -> usize {
        for path in &results.paths {
            ingest_path(store, path);
        }

        let asset_count = results.assets.len();
        for record in results.assets {
            ingest_asset(store, &self.classifier, record);
        }

        for data in &results.dependencies {
            ingest_dependencies(store, data);
        }

        self.packages_requiring_load
            .extend(results.cooked_without_metadata);
        asset_count
    }
}
