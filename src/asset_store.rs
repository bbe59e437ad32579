//! Multi-index asset store.
//!
//! Records live in an index arena. Five indices (object path, package name,
//! package path, class, tag key) map to [`AssetId`]s and are kept consistent
//! on every add, update and remove. The store also owns the dependency graph,
//! the folder tree, the empty package set and the cached class inheritance
//! map, and queues lifecycle events for the registry to broadcast.

use crate::asset_data::{AssetKind, AssetRecord, GENERATED_CLASS_TAG, PARENT_CLASS_TAG};
use crate::class_hierarchy::ClassInheritanceMap;
use crate::depends::DependencyGraph;
use crate::events::RegistryEvent;
use crate::package_name::export_text_path_to_object_name;
use crate::path_tree::PathTree;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u32);

impl AssetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

type Bucket = HashSet<AssetId>;

fn bucket_insert(index: &mut HashMap<String, Bucket>, key: &str, id: AssetId) {
    index.entry(key.to_string()).or_default().insert(id);
}

fn bucket_remove(index: &mut HashMap<String, Bucket>, key: &str, id: AssetId) {
    if let Some(bucket) = index.get_mut(key) {
        bucket.remove(&id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

/// The (generated class, parent class) pair a class generator record
/// contributes to the inheritance map.
fn generated_class_entry(record: &AssetRecord) -> Option<(String, String)> {
    if !record.is_class_generator() {
        return None;
    }
    let generated = record.tag(GENERATED_CLASS_TAG)?;
    let parent = record.tag(PARENT_CLASS_TAG)?;
    Some((
        export_text_path_to_object_name(generated).to_string(),
        export_text_path_to_object_name(parent).to_string(),
    ))
}

#[derive(Debug, Default)]
pub struct AssetStore {
    records: Vec<Option<AssetRecord>>,
    free_slots: Vec<u32>,
    by_object_path: HashMap<String, AssetId>,
    by_package: HashMap<String, Bucket>,
    by_path: HashMap<String, Bucket>,
    by_class: HashMap<String, Bucket>,
    by_tag: HashMap<String, Bucket>,
    empty_packages: HashSet<String>,
    inheritance: ClassInheritanceMap,
    graph: DependencyGraph,
    paths: PathTree,
    events: Vec<RegistryEvent>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves room for `additional` records, used before bulk loads.
    pub fn reserve(&mut self, additional: usize) {
        self.records.reserve(additional);
        self.by_object_path.reserve(additional);
    }

    pub fn len(&self) -> usize {
        self.by_object_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object_path.is_empty()
    }

    pub fn get(&self, id: AssetId) -> Option<&AssetRecord> {
        self.records.get(id.index()).and_then(Option::as_ref)
    }

    pub fn find_id(&self, object_path: &str) -> Option<AssetId> {
        self.by_object_path.get(object_path).copied()
    }

    pub fn find(&self, object_path: &str) -> Option<&AssetRecord> {
        self.get(self.find_id(object_path)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetId, &AssetRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| record.as_ref().map(|r| (AssetId(idx as u32), r)))
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.iter().map(|(_, record)| record)
    }

    fn bucket(index: &HashMap<String, Bucket>, key: &str) -> Vec<AssetId> {
        index
            .get(key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn ids_in_package(&self, package_name: &str) -> Vec<AssetId> {
        Self::bucket(&self.by_package, package_name)
    }

    pub fn ids_in_path(&self, package_path: &str) -> Vec<AssetId> {
        Self::bucket(&self.by_path, package_path)
    }

    pub fn ids_of_class(&self, class_name: &str) -> Vec<AssetId> {
        Self::bucket(&self.by_class, class_name)
    }

    pub fn ids_with_tag(&self, tag: &str) -> Vec<AssetId> {
        Self::bucket(&self.by_tag, tag)
    }

    pub fn has_assets_in_path(&self, package_path: &str) -> bool {
        self.by_path.contains_key(package_path)
    }

    pub fn package_count(&self) -> usize {
        self.by_package.len()
    }

    /// Inserts a new record into every index. Adding an identity that is
    /// already present is a caller error.
    pub fn add(&mut self, record: AssetRecord) -> AssetId {
        if let Some(existing) = self.find_id(&record.object_path) {
            debug_assert!(false, "asset {} added twice", record.object_path);
            warn!(object_path = %record.object_path, "asset added twice, updating in place");
            self.update(existing, record);
            return existing;
        }

        let id = match self.free_slots.pop() {
            Some(slot) => AssetId(slot),
            None => {
                self.records.push(None);
                AssetId((self.records.len() - 1) as u32)
            }
        };

        self.by_object_path.insert(record.object_path.clone(), id);
        bucket_insert(&mut self.by_package, &record.package_name, id);
        bucket_insert(&mut self.by_path, &record.package_path, id);
        bucket_insert(&mut self.by_class, &record.asset_class, id);
        for tag in record.tags.keys() {
            bucket_insert(&mut self.by_tag, tag, id);
        }

        if let Some((generated, parent)) = generated_class_entry(&record) {
            self.inheritance.insert(&generated, &parent);
        }

        self.events.push(RegistryEvent::AssetAdded(record.clone()));
        self.records[id.index()] = Some(record);
        id
    }

    /// Replaces the record stored at `id`, touching only the indices whose
    /// key actually changed.
    pub fn update(&mut self, id: AssetId, new_record: AssetRecord) -> bool {
        let Some(old) = self.records.get_mut(id.index()).and_then(Option::take) else {
            debug_assert!(false, "update of a freed asset slot");
            return false;
        };

        if old.object_path != new_record.object_path {
            debug_assert!(
                !self.by_object_path.contains_key(&new_record.object_path),
                "update would collide with {}",
                new_record.object_path
            );
            self.by_object_path.remove(&old.object_path);
            self.by_object_path.insert(new_record.object_path.clone(), id);
        }

        if old.package_name != new_record.package_name {
            bucket_remove(&mut self.by_package, &old.package_name, id);
            bucket_insert(&mut self.by_package, &new_record.package_name, id);
        }

        if old.package_path != new_record.package_path {
            bucket_remove(&mut self.by_path, &old.package_path, id);
            bucket_insert(&mut self.by_path, &new_record.package_path, id);
        }

        if old.asset_class != new_record.asset_class {
            bucket_remove(&mut self.by_class, &old.asset_class, id);
            bucket_insert(&mut self.by_class, &new_record.asset_class, id);
        }

        for tag in old.tags.keys() {
            if !new_record.tags.contains_key(tag) {
                bucket_remove(&mut self.by_tag, tag, id);
            }
        }
        for tag in new_record.tags.keys() {
            if !old.tags.contains_key(tag) {
                bucket_insert(&mut self.by_tag, tag, id);
            }
        }

        let old_entry = generated_class_entry(&old);
        let new_entry = generated_class_entry(&new_record);
        if old_entry != new_entry {
            if let Some((generated, _)) = old_entry {
                self.inheritance.remove(&generated);
            }
            if let Some((generated, parent)) = new_entry {
                self.inheritance.insert(&generated, &parent);
            }
        }

        self.records[id.index()] = Some(new_record);
        true
    }

    /// Removes the record from every index and prunes its package's
    /// dependency node.
    pub fn remove(&mut self, object_path: &str) -> Option<AssetRecord> {
        let Some(id) = self.find_id(object_path) else {
            debug_assert!(false, "removing unknown asset {object_path}");
            return None;
        };
        let record = self.records.get_mut(id.index()).and_then(Option::take)?;

        self.events.push(RegistryEvent::AssetRemoved(record.clone()));

        if let Some((generated, _)) = generated_class_entry(&record) {
            self.inheritance.remove(&generated);
        }

        self.by_object_path.remove(&record.object_path);
        bucket_remove(&mut self.by_package, &record.package_name, id);
        bucket_remove(&mut self.by_path, &record.package_path, id);
        bucket_remove(&mut self.by_class, &record.asset_class, id);
        for tag in record.tags.keys() {
            bucket_remove(&mut self.by_tag, tag, id);
        }

        self.graph.remove(&record.package_name);
        self.free_slots.push(id.0);
        Some(record)
    }

    /// Removes every cached asset in `package_name`.
    pub fn remove_package(&mut self, package_name: &str) -> Vec<AssetRecord> {
        let mut paths: Vec<String> = self
            .ids_in_package(package_name)
            .into_iter()
            .filter_map(|id| self.get(id).map(|r| r.object_path.clone()))
            .collect();
        paths.sort();
        paths.iter().filter_map(|path| self.remove(path)).collect()
    }

    pub fn mark_package_empty(&mut self, package_name: &str) {
        self.empty_packages.insert(package_name.to_string());
    }

    pub fn unmark_package_empty(&mut self, package_name: &str) -> bool {
        self.empty_packages.remove(package_name)
    }

    pub fn is_package_empty(&self, package_name: &str) -> bool {
        self.empty_packages.contains(package_name)
    }

    pub fn empty_packages(&self) -> &HashSet<String> {
        &self.empty_packages
    }

    pub fn is_map_package(&self, package_name: &str) -> bool {
        self.by_package.get(package_name).is_some_and(|bucket| {
            bucket
                .iter()
                .any(|&id| self.get(id).is_some_and(AssetRecord::is_map))
        })
    }

    fn packages_of_kind(&self, kind: AssetKind) -> HashSet<String> {
        self.records()
            .filter(|record| record.kind == kind)
            .map(|record| record.package_name.clone())
            .collect()
    }

    pub fn redirector_packages(&self) -> HashSet<String> {
        self.packages_of_kind(AssetKind::Redirector)
    }

    pub fn map_packages(&self) -> HashSet<String> {
        self.packages_of_kind(AssetKind::Map)
    }

    pub fn inheritance_map(&self) -> &ClassInheritanceMap {
        &self.inheritance
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    pub fn paths(&self) -> &PathTree {
        &self.paths
    }

    pub fn add_path(&mut self, path: &str) -> bool {
        if self.paths.cache_path(path) {
            self.events.push(RegistryEvent::PathAdded(path.to_string()));
            return true;
        }
        false
    }

    /// Removes a folder from the tree. Without `force` the removal fails
    /// while the folder or any subfolder still has cached assets.
    pub fn remove_path(&mut self, path: &str, force: bool) -> bool {
        if !force {
            let occupied = self.has_assets_in_path(path)
                || self
                    .paths
                    .sub_paths(path, true)
                    .iter()
                    .any(|sub| self.has_assets_in_path(sub));
            if occupied {
                return false;
            }
        }

        if self.paths.remove_folder(path) {
            self.events.push(RegistryEvent::PathRemoved(path.to_string()));
            return true;
        }
        false
    }

    pub(crate) fn push_event(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drops every record, node and folder. Returns false if the dependency
    /// node accounting does not balance.
    pub fn clear(&mut self) -> bool {
        self.records.clear();
        self.free_slots.clear();
        self.by_object_path.clear();
        self.by_package.clear();
        self.by_path.clear();
        self.by_class.clear();
        self.by_tag.clear();
        self.empty_packages.clear();
        self.inheritance.clear();
        self.paths.clear();
        self.events.clear();
        self.graph.clear()
    }

    /// Checks that every index agrees with the stored records.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut live = 0;
        for (id, record) in self.iter() {
            live += 1;
            assert_eq!(self.find_id(&record.object_path), Some(id));
            assert!(self.by_package[&record.package_name].contains(&id));
            assert!(self.by_path[&record.package_path].contains(&id));
            assert!(self.by_class[&record.asset_class].contains(&id));
            for tag in record.tags.keys() {
                assert!(self.by_tag[tag].contains(&id));
            }
        }
        assert_eq!(live, self.by_object_path.len());

        self.assert_index(&self.by_package, |r| r.package_name.as_str());
        self.assert_index(&self.by_path, |r| r.package_path.as_str());
        self.assert_index(&self.by_class, |r| r.asset_class.as_str());
        for (tag, bucket) in &self.by_tag {
            for id in bucket {
                assert!(self.get(*id).unwrap().tags.contains_key(tag));
            }
        }
    }

    #[cfg(test)]
    fn assert_index(&self, index: &HashMap<String, Bucket>, key: impl Fn(&AssetRecord) -> &str) {
        for (value, bucket) in index {
            assert!(!bucket.is_empty());
            for id in bucket {
                let record = self.get(*id).expect("indexed id must be live");
                assert_eq!(key(record), value.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(package: &str, generated: &str, parent: &str) -> AssetRecord {
        AssetRecord::new(package, package.rsplit('/').next().unwrap(), "Blueprint")
            .with_kind(AssetKind::ClassGenerator)
            .with_tag(GENERATED_CLASS_TAG, generated)
            .with_tag(PARENT_CLASS_TAG, parent)
    }

    #[test]
    fn add_populates_every_index() {
        let mut store = AssetStore::new();
        let id = store.add(AssetRecord::new("/Game/Props/Crate", "Crate", "StaticMesh").with_tag("Triangles", "12"));

        assert_eq!(store.find("/Game/Props/Crate.Crate").map(|r| r.asset_name.as_str()), Some("Crate"));
        assert_eq!(store.ids_in_package("/Game/Props/Crate"), vec![id]);
        assert_eq!(store.ids_in_path("/Game/Props"), vec![id]);
        assert_eq!(store.ids_of_class("StaticMesh"), vec![id]);
        assert_eq!(store.ids_with_tag("Triangles"), vec![id]);
        assert!(matches!(store.take_events().as_slice(), [RegistryEvent::AssetAdded(_)]));
        store.assert_consistent();
    }

    #[test]
    fn rename_moves_identity_and_package_buckets() {
        let mut store = AssetStore::new();
        let id = store.add(AssetRecord::new("/Game/Foo", "Foo", "Texture2D"));

        store.update(id, AssetRecord::new("/Game/Foo2", "Foo2", "Texture2D"));

        assert!(store.find("/Game/Foo.Foo").is_none());
        assert_eq!(store.find_id("/Game/Foo2.Foo2"), Some(id));
        assert!(store.ids_in_package("/Game/Foo").is_empty());
        assert_eq!(store.ids_in_package("/Game/Foo2"), vec![id]);
        store.assert_consistent();
    }

    #[test]
    fn update_moves_changed_tags_only() {
        let mut store = AssetStore::new();
        let id = store.add(
            AssetRecord::new("/Game/A", "A", "Texture2D")
                .with_tag("Width", "64")
                .with_tag("Format", "DXT1"),
        );

        let updated = AssetRecord::new("/Game/A", "A", "Texture2D")
            .with_tag("Width", "128")
            .with_tag("Mips", "7");
        store.update(id, updated);

        assert_eq!(store.ids_with_tag("Width"), vec![id]);
        assert!(store.ids_with_tag("Format").is_empty());
        assert_eq!(store.ids_with_tag("Mips"), vec![id]);
        assert_eq!(store.get(id).unwrap().tag("Width"), Some("128"));
        store.assert_consistent();
    }

    #[test]
    fn class_generators_feed_the_inheritance_map() {
        let mut store = AssetStore::new();
        let id = store.add(blueprint(
            "/Game/BP_Door",
            "BlueprintGeneratedClass'/Game/BP_Door.BP_Door_C'",
            "Class'/Script/Engine.Actor'",
        ));
        assert_eq!(store.inheritance_map().parent("BP_Door_C"), Some("Actor"));

        store.update(
            id,
            blueprint("/Game/BP_Door", "/Game/BP_Door.BP_Door_C", "/Game/BP_Base.BP_Base_C"),
        );
        assert_eq!(store.inheritance_map().parent("BP_Door_C"), Some("BP_Base_C"));

        store.remove("/Game/BP_Door.BP_Door");
        assert!(store.inheritance_map().is_empty());
    }

    #[test]
    fn remove_clears_indices_and_prunes_node() {
        let mut store = AssetStore::new();
        store.add(AssetRecord::new("/Game/A", "A", "Material").with_tag("Domain", "Surface"));
        store.add(AssetRecord::new("/Game/B", "B", "Material"));
        store.graph_mut().set_dependencies("/Game/B", ["/Game/A"], Vec::<String>::new());

        let removed = store.remove("/Game/A.A").unwrap();
        assert_eq!(removed.package_name, "/Game/A");
        assert!(store.ids_of_class("Material").len() == 1);
        assert!(store.ids_with_tag("Domain").is_empty());
        assert!(store.graph().find("/Game/A").is_none());
        assert_eq!(
            store.graph().get_dependencies("/Game/B", Default::default()),
            Some(vec![])
        );
        store.assert_consistent();

        // The freed slot is reused by the next add
        let id = store.add(AssetRecord::new("/Game/C", "C", "Material"));
        assert_eq!(id, AssetId(0));
        store.assert_consistent();
    }

    #[test]
    fn remove_path_refuses_occupied_folders() {
        let mut store = AssetStore::new();
        store.add_path("/Game/Props/Crates");
        store.add(AssetRecord::new("/Game/Props/Crates/Crate", "Crate", "StaticMesh"));

        assert!(!store.remove_path("/Game/Props", false));
        assert!(store.remove_path("/Game/Props", true));
        assert!(!store.paths().contains("/Game/Props/Crates"));
    }

    #[test]
    fn empty_package_set_toggles() {
        let mut store = AssetStore::new();
        store.mark_package_empty("/Game/Bar");
        assert!(store.is_package_empty("/Game/Bar"));
        assert!(store.unmark_package_empty("/Game/Bar"));
        assert!(!store.unmark_package_empty("/Game/Bar"));
    }

    #[test]
    fn clear_balances_node_counts() {
        let mut store = AssetStore::new();
        store.add(AssetRecord::new("/Game/A", "A", "Material"));
        store.graph_mut().set_dependencies("/Game/A", ["/Game/B"], Vec::<String>::new());
        assert!(store.clear());
        assert!(store.is_empty());
    }
}
