//! Package dependency graph.
//!
//! Nodes live in an index arena and refer to each other by [`NodeId`].
//! Every forward edge (hard or soft) has a matching referencer edge on the
//! target node; both halves are always added and removed together.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Hard,
    Soft,
}

/// Which dependency kinds a query should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyQuery {
    pub hard: bool,
    pub soft: bool,
}

impl DependencyQuery {
    pub const ALL: DependencyQuery = DependencyQuery { hard: true, soft: true };
    pub const HARD: DependencyQuery = DependencyQuery { hard: true, soft: false };
    pub const SOFT: DependencyQuery = DependencyQuery { hard: false, soft: true };
    pub const NONE: DependencyQuery = DependencyQuery { hard: false, soft: false };

    pub fn is_all(self) -> bool {
        self.hard && self.soft
    }

    pub fn is_none(self) -> bool {
        !self.hard && !self.soft
    }
}

impl Default for DependencyQuery {
    fn default() -> Self {
        DependencyQuery::ALL
    }
}

#[derive(Debug, Clone)]
pub struct DependsNode {
    pub package_name: String,
    hard: HashSet<NodeId>,
    soft: HashSet<NodeId>,
    referencers: HashSet<NodeId>,
}

impl DependsNode {
    fn new(package_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            hard: HashSet::new(),
            soft: HashSet::new(),
            referencers: HashSet::new(),
        }
    }

    pub fn hard_dependencies(&self) -> &HashSet<NodeId> {
        &self.hard
    }

    pub fn soft_dependencies(&self) -> &HashSet<NodeId> {
        &self.soft
    }

    pub fn referencers(&self) -> &HashSet<NodeId> {
        &self.referencers
    }

    pub fn dependency_kind(&self, target: NodeId) -> Option<DependencyKind> {
        if self.hard.contains(&target) {
            Some(DependencyKind::Hard)
        } else if self.soft.contains(&target) {
            Some(DependencyKind::Soft)
        } else {
            None
        }
    }

    pub fn depends_on(&self, target: NodeId, query: DependencyQuery) -> bool {
        match self.dependency_kind(target) {
            Some(DependencyKind::Hard) => query.hard,
            Some(DependencyKind::Soft) => query.soft,
            None => false,
        }
    }

    pub fn dependencies(&self, query: DependencyQuery) -> impl Iterator<Item = NodeId> + '_ {
        let hard = self.hard.iter().filter(move |_| query.hard);
        let soft = self.soft.iter().filter(move |_| query.soft);
        hard.chain(soft).copied()
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Option<DependsNode>>,
    free_slots: Vec<u32>,
    by_package: HashMap<String, NodeId>,
    nodes_created: usize,
    nodes_destroyed: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            by_package: HashMap::with_capacity(capacity),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.by_package.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }

    pub fn nodes_created(&self) -> usize {
        self.nodes_created
    }

    pub fn nodes_destroyed(&self) -> usize {
        self.nodes_destroyed
    }

    pub fn find(&self, package_name: &str) -> Option<NodeId> {
        self.by_package.get(package_name).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&DependsNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut DependsNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn package_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.package_name.as_str())
    }

    pub fn get_or_create(&mut self, package_name: &str) -> NodeId {
        if let Some(id) = self.find(package_name) {
            return id;
        }

        let node = DependsNode::new(package_name);
        let id = match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        };

        self.nodes_created += 1;
        self.by_package.insert(package_name.to_string(), id);
        id
    }

    /// Removes every forward edge of `id` together with the matching
    /// referencer edges.
    pub fn clear_dependencies(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let old: Vec<NodeId> = node.hard.drain().chain(node.soft.drain()).collect();

        for dependency in old {
            if let Some(target) = self.node_mut(dependency) {
                target.referencers.remove(&id);
            }
        }
    }

    fn link(&mut self, from: NodeId, to: NodeId, kind: DependencyKind) {
        if from == to {
            return;
        }
        let Some(node) = self.node_mut(from) else {
            return;
        };
        match kind {
            DependencyKind::Hard => {
                node.soft.remove(&to);
                node.hard.insert(to);
            }
            DependencyKind::Soft => {
                if node.hard.contains(&to) {
                    return;
                }
                node.soft.insert(to);
            }
        }
        if let Some(target) = self.node_mut(to) {
            target.referencers.insert(from);
        }
    }

    /// Replaces the dependencies of `package_name`. A package listed in both
    /// sets becomes a hard dependency.
    pub fn set_dependencies<H, S>(&mut self, package_name: &str, hard: H, soft: S) -> NodeId
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let id = self.get_or_create(package_name);
        self.clear_dependencies(id);

        for dependency in hard {
            let target = self.get_or_create(dependency.as_ref());
            self.link(id, target, DependencyKind::Hard);
        }
        for dependency in soft {
            let target = self.get_or_create(dependency.as_ref());
            self.link(id, target, DependencyKind::Soft);
        }
        id
    }

    /// Package names `package_name` depends on. `None` if the package has no
    /// node.
    pub fn get_dependencies(&self, package_name: &str, query: DependencyQuery) -> Option<Vec<String>> {
        let node = self.node(self.find(package_name)?)?;
        let mut names: Vec<String> = node
            .dependencies(query)
            .filter_map(|id| self.package_name(id))
            .map(str::to_string)
            .collect();
        names.sort();
        Some(names)
    }

    /// Package names that depend on `package_name`. When the query is scoped
    /// to one kind only referencers whose forward edge has that kind are
    /// returned.
    pub fn get_referencers(&self, package_name: &str, query: DependencyQuery) -> Option<Vec<String>> {
        let id = self.find(package_name)?;
        let node = self.node(id)?;
        if query.is_none() {
            return Some(Vec::new());
        }

        let mut names: Vec<String> = node
            .referencers
            .iter()
            .filter_map(|&referencer| self.node(referencer))
            .filter(|referencer| query.is_all() || referencer.depends_on(id, query))
            .map(|referencer| referencer.package_name.clone())
            .collect();
        names.sort();
        Some(names)
    }

    /// Follows a chain of redirector packages to the first hard dependency
    /// in `allowed`. Falls back to `start` when the chain cannot be resolved
    /// or loops back on itself.
    pub fn resolve_redirector(
        &self,
        start: NodeId,
        allowed: &HashSet<String>,
        redirectors: &HashSet<String>,
        cache: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(&resolved) = cache.get(&start) {
            return resolved;
        }

        let mut visited = HashSet::new();
        let mut current = start;
        let resolved = loop {
            if !visited.insert(current) {
                debug!(
                    package = self.package_name(start).unwrap_or_default(),
                    "redirector cycle detected"
                );
                break start;
            }

            let Some(node) = self.node(current) else {
                break start;
            };
            if !redirectors.contains(&node.package_name) {
                break current;
            }

            let mut hard: Vec<&DependsNode> =
                node.hard.iter().filter_map(|&id| self.node(id)).collect();
            hard.sort_by(|a, b| a.package_name.cmp(&b.package_name));

            let mut target = None;
            let mut next = None;
            for dependency in hard {
                if allowed.contains(&dependency.package_name) {
                    target = self.find(&dependency.package_name);
                    break;
                }
                if next.is_none() && redirectors.contains(&dependency.package_name) {
                    next = self.find(&dependency.package_name);
                }
            }

            match (target, next) {
                (Some(target), _) => break target,
                (None, Some(next)) => current = next,
                (None, None) => break start,
            }
        };

        cache.insert(start, resolved);
        resolved
    }

    /// Unlinks the node from both directions and frees its slot.
    pub fn remove(&mut self, package_name: &str) -> bool {
        let Some(id) = self.by_package.remove(package_name) else {
            return false;
        };
        let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::take) else {
            debug_assert!(false, "package index points at an empty slot");
            warn!(package_name, "dependency index pointed at a freed node");
            return false;
        };

        for dependency in node.hard.iter().chain(node.soft.iter()) {
            if let Some(target) = self.node_mut(*dependency) {
                target.referencers.remove(&id);
            }
        }
        for referencer in &node.referencers {
            if let Some(source) = self.node_mut(*referencer) {
                source.hard.remove(&id);
                source.soft.remove(&id);
            }
        }

        self.free_slots.push(id.0);
        self.nodes_destroyed += 1;
        true
    }

    /// Moves the node of `old_name`, edges included, under `new_name`.
    /// Returns false if `old_name` has no node or `new_name` already has one.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        if self.by_package.contains_key(new_name) {
            return false;
        }
        let Some(id) = self.by_package.remove(old_name) else {
            return false;
        };
        if let Some(node) = self.node_mut(id) {
            node.package_name = new_name.to_string();
        }
        self.by_package.insert(new_name.to_string(), id);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DependsNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| node.as_ref().map(|node| (NodeId(idx as u32), node)))
    }

    /// Drops every node. Returns false if the created/destroyed counts do not
    /// balance afterwards.
    pub fn clear(&mut self) -> bool {
        let remaining = self.by_package.len();
        self.nodes.clear();
        self.free_slots.clear();
        self.by_package.clear();
        self.nodes_destroyed += remaining;

        let balanced = self.nodes_created == self.nodes_destroyed;
        if !balanced {
            warn!(
                created = self.nodes_created,
                destroyed = self.nodes_destroyed,
                "dependency node counts do not balance"
            );
        }
        balanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn edges_are_added_in_pairs() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], ["/Game/C"]);

        assert_eq!(
            graph.get_dependencies("/Game/A", DependencyQuery::ALL).unwrap(),
            vec!["/Game/B", "/Game/C"]
        );
        assert_eq!(graph.get_referencers("/Game/B", DependencyQuery::ALL).unwrap(), vec!["/Game/A"]);
        assert_eq!(graph.get_referencers("/Game/C", DependencyQuery::HARD).unwrap(), Vec::<String>::new());
        assert_eq!(graph.get_referencers("/Game/C", DependencyQuery::SOFT).unwrap(), vec!["/Game/A"]);
    }

    #[test]
    fn renaming_keeps_edges_in_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], ["/Game/C"]);
        graph.set_dependencies("/Game/D", ["/Game/A"], Vec::<String>::new());

        assert!(graph.rename("/Game/A", "/Game/A2"));
        assert!(graph.find("/Game/A").is_none());
        assert_eq!(
            graph.get_dependencies("/Game/A2", DependencyQuery::ALL).unwrap(),
            vec!["/Game/B", "/Game/C"]
        );
        assert_eq!(graph.get_referencers("/Game/B", DependencyQuery::HARD).unwrap(), vec!["/Game/A2"]);
        assert_eq!(graph.get_dependencies("/Game/D", DependencyQuery::HARD).unwrap(), vec!["/Game/A2"]);

        assert!(!graph.rename("/Game/A2", "/Game/B"));
        assert!(!graph.rename("/Game/Missing", "/Game/Other"));
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn depends_on_honors_the_query_kind() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], ["/Game/C"]);
        let node = graph.node(graph.find("/Game/A").unwrap()).unwrap();
        let (b, c) = (graph.find("/Game/B").unwrap(), graph.find("/Game/C").unwrap());

        assert_eq!(node.dependency_kind(b), Some(DependencyKind::Hard));
        assert!(node.depends_on(b, DependencyQuery::HARD));
        assert!(!node.depends_on(b, DependencyQuery::SOFT));
        assert!(node.depends_on(c, DependencyQuery::SOFT));
        assert!(!node.depends_on(c, DependencyQuery::HARD));
        assert!(!node.depends_on(graph.find("/Game/A").unwrap(), DependencyQuery::ALL));
    }

    #[test]
    fn rebuilding_clears_old_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], Vec::<String>::new());
        graph.set_dependencies("/Game/A", ["/Game/C"], Vec::<String>::new());

        assert_eq!(graph.get_referencers("/Game/B", DependencyQuery::ALL).unwrap(), Vec::<String>::new());
        assert_eq!(graph.get_dependencies("/Game/A", DependencyQuery::HARD).unwrap(), vec!["/Game/C"]);
    }

    #[test]
    fn hard_wins_over_soft() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], ["/Game/B"]);

        assert_eq!(graph.get_dependencies("/Game/A", DependencyQuery::SOFT).unwrap(), Vec::<String>::new());
        assert_eq!(graph.get_referencers("/Game/B", DependencyQuery::HARD).unwrap(), vec!["/Game/A"]);
    }

    #[test]
    fn empty_query_returns_empty() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], Vec::<String>::new());

        assert_eq!(graph.get_dependencies("/Game/A", DependencyQuery::NONE), Some(vec![]));
        assert_eq!(graph.get_referencers("/Game/B", DependencyQuery::NONE), Some(vec![]));
        assert_eq!(graph.get_dependencies("/Game/Missing", DependencyQuery::ALL), None);
    }

    #[test]
    fn remove_unlinks_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], Vec::<String>::new());
        graph.set_dependencies("/Game/B", ["/Game/C"], Vec::<String>::new());

        assert!(graph.remove("/Game/B"));
        assert!(!graph.remove("/Game/B"));
        assert_eq!(graph.get_dependencies("/Game/A", DependencyQuery::ALL).unwrap(), Vec::<String>::new());
        assert_eq!(graph.get_referencers("/Game/C", DependencyQuery::ALL).unwrap(), Vec::<String>::new());

        // The freed slot is reused
        let reused = graph.get_or_create("/Game/D");
        assert_eq!(graph.package_name(reused), Some("/Game/D"));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn node_counts_balance_after_clear() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B", "/Game/C"], Vec::<String>::new());
        graph.remove("/Game/C");
        assert_eq!(graph.nodes_created(), 3);
        assert_eq!(graph.nodes_destroyed(), 1);
        assert!(graph.clear());
        assert!(graph.is_empty());
    }

    #[test]
    fn resolves_redirector_chains() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/Old", ["/Game/Older"], Vec::<String>::new());
        graph.set_dependencies("/Game/Older", ["/Game/New"], Vec::<String>::new());
        graph.get_or_create("/Game/New");

        let redirectors = set(&["/Game/Old", "/Game/Older"]);
        let allowed = set(&["/Game/New"]);
        let mut cache = HashMap::new();

        let start = graph.find("/Game/Old").unwrap();
        let resolved = graph.resolve_redirector(start, &allowed, &redirectors, &mut cache);
        assert_eq!(graph.package_name(resolved), Some("/Game/New"));
        assert_eq!(cache.get(&start), Some(&resolved));

        let plain = graph.find("/Game/New").unwrap();
        assert_eq!(graph.resolve_redirector(plain, &allowed, &redirectors, &mut cache), plain);
    }

    #[test]
    fn redirector_cycle_falls_back_to_start() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("/Game/A", ["/Game/B"], Vec::<String>::new());
        graph.set_dependencies("/Game/B", ["/Game/A"], Vec::<String>::new());

        let redirectors = set(&["/Game/A", "/Game/B"]);
        let mut cache = HashMap::new();
        let start = graph.find("/Game/A").unwrap();

        assert_eq!(
            graph.resolve_redirector(start, &HashSet::new(), &redirectors, &mut cache),
            start
        );
    }
}
