use std::collections::BTreeSet;
use std::ops::Bound;

/// Every folder known to the registry, including empty ones.
#[derive(Debug, Default, Clone)]
pub struct PathTree {
    paths: BTreeSet<String>,
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        ""
    } else {
        trimmed
    }
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` and all of its parents. Returns true if `path` was new.
    pub fn cache_path(&mut self, path: &str) -> bool {
        let path = normalize(path);
        if path.is_empty() || self.paths.contains(path) {
            return false;
        }

        for (end, _) in path.match_indices('/').filter(|&(end, _)| end > 0) {
            self.paths.insert(path[..end].to_string());
        }

        self.paths.insert(path.to_string())
    }

    /// Removes `path` and everything below it. Returns false if the folder
    /// was not in the tree.
    pub fn remove_folder(&mut self, path: &str) -> bool {
        let path = normalize(path);
        if !self.paths.remove(path) {
            return false;
        }

        let children = self.sub_paths(path, true);
        for child in children {
            self.paths.remove(&child);
        }
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(normalize(path))
    }

    /// Folders below `base_path`, not including `base_path` itself. An empty
    /// base lists every folder.
    pub fn sub_paths(&self, base_path: &str, recurse: bool) -> Vec<String> {
        let base = normalize(base_path);
        let prefix = format!("{base}/");

        self.paths
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|p| p.starts_with(prefix.as_str()))
            .filter(|p| recurse || !p[prefix.len()..].contains('/'))
            .cloned()
            .collect()
    }

    pub fn all_paths(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caching_adds_parents() {
        let mut tree = PathTree::new();
        assert!(tree.cache_path("/Game/Maps/Arena"));
        assert!(tree.contains("/Game"));
        assert!(tree.contains("/Game/Maps/"));
        assert!(!tree.cache_path("/Game/Maps/Arena"));
        assert!(!tree.cache_path("/"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn caches_parents_of_non_ascii_paths() {
        let mut tree = PathTree::new();
        assert!(tree.cache_path("é/Maps"));
        assert!(tree.contains("é"));
        assert!(tree.contains("é/Maps"));

        assert!(tree.cache_path("/Jeu/Cartes/Arène/Été"));
        assert!(tree.contains("/Jeu/Cartes/Arène"));
        assert_eq!(tree.sub_paths("/Jeu", true).len(), 3);
    }

    #[test]
    fn sub_paths_respect_recursion() {
        let mut tree = PathTree::new();
        tree.cache_path("/Game/Maps/Arena");
        tree.cache_path("/Game/Props");
        tree.cache_path("/GameData");

        assert_eq!(tree.sub_paths("/Game", false), vec!["/Game/Maps", "/Game/Props"]);
        assert_eq!(
            tree.sub_paths("/Game", true),
            vec!["/Game/Maps", "/Game/Maps/Arena", "/Game/Props"]
        );
        assert_eq!(tree.sub_paths("", true).len(), 5);
        assert_eq!(tree.sub_paths("", false), vec!["/Game", "/GameData"]);
    }

    #[test]
    fn removing_a_folder_removes_children() {
        let mut tree = PathTree::new();
        tree.cache_path("/Game/Maps/Arena");
        tree.cache_path("/Game/Props");

        assert!(tree.remove_folder("/Game/Maps"));
        assert!(!tree.contains("/Game/Maps/Arena"));
        assert!(tree.contains("/Game/Props"));
        assert!(!tree.remove_folder("/Game/Maps"));
    }
}
