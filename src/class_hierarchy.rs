use crate::live::LiveClass;
use std::collections::{HashMap, HashSet};
use tracing::error;

pub const MAX_INHERITANCE_DEPTH: usize = 65536;

/// Generated class name to parent class name, filled from cached class
/// generator assets. Resident classes are merged in at query time.
#[derive(Debug, Default, Clone)]
pub struct ClassInheritanceMap {
    parents: HashMap<String, String>,
}

impl ClassInheritanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_name: &str, parent_class_name: &str) {
        self.parents
            .insert(class_name.to_string(), parent_class_name.to_string());
    }

    pub fn remove(&mut self, class_name: &str) -> Option<String> {
        self.parents.remove(class_name)
    }

    pub fn parent(&self, class_name: &str) -> Option<&str> {
        self.parents.get(class_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn clear(&mut self) {
        self.parents.clear();
    }

    /// Parent chain of `class_name`, nearest first. `None` if the class is
    /// unknown or the chain never ends.
    pub fn ancestors(&self, class_name: &str, live_classes: &[LiveClass]) -> Option<Vec<String>> {
        // Empty parent marks a root class
        let mut merged: HashMap<&str, &str> = self
            .parents
            .iter()
            .map(|(class, parent)| (class.as_str(), parent.as_str()))
            .collect();
        for class in live_classes.iter().filter(|c| !c.deprecated) {
            merged.insert(&class.name, class.parent.as_deref().unwrap_or(""));
        }

        if !merged.contains_key(class_name) {
            return None;
        }

        let mut ancestors = Vec::new();
        let mut current = class_name;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            match merged.get(current) {
                Some(parent) if !parent.is_empty() => {
                    ancestors.push(parent.to_string());
                    current = parent;
                }
                _ => return Some(ancestors),
            }
        }

        error!(
            class_name,
            "exceeded max inheritance depth, there is probably a loop of parent classes"
        );
        None
    }

    /// Every class derived from one of `class_names`, including the classes
    /// themselves. Excluded classes and their subtrees are skipped.
    pub fn sub_classes(
        &self,
        class_names: &[String],
        excluded: &HashSet<String>,
        live_classes: &[LiveClass],
    ) -> HashSet<String> {
        let mut children: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut live_names = HashSet::new();

        for class in live_classes.iter().filter(|c| !c.deprecated) {
            if let Some(parent) = class.parent.as_deref() {
                children.entry(parent).or_default().insert(&class.name);
            }
            live_names.insert(class.name.as_str());
        }

        for (class, parent) in &self.parents {
            if !live_names.contains(class.as_str()) && !parent.is_empty() {
                children.entry(parent).or_default().insert(class);
            }
        }

        let mut result = HashSet::new();
        let mut stack: Vec<(&str, usize)> = class_names.iter().map(|c| (c.as_str(), 0)).collect();

        while let Some((class, depth)) = stack.pop() {
            if excluded.contains(class) || result.contains(class) {
                continue;
            }
            if depth >= MAX_INHERITANCE_DEPTH {
                error!(class, "exceeded max inheritance depth while collecting subclasses");
                continue;
            }
            result.insert(class.to_string());

            if let Some(subclasses) = children.get(class) {
                stack.extend(subclasses.iter().map(|sub| (*sub, depth + 1)));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn ancestors_merge_live_and_cached() {
        let mut map = ClassInheritanceMap::new();
        map.insert("BP_Door_C", "BP_Base_C");
        map.insert("BP_Base_C", "Actor");

        let live = vec![LiveClass::new("Actor", Some("Object")), LiveClass::new("Object", None)];

        assert_eq!(
            map.ancestors("BP_Door_C", &live).unwrap(),
            vec!["BP_Base_C", "Actor", "Object"]
        );
        assert_eq!(map.ancestors("Object", &live).unwrap(), Vec::<String>::new());
        assert!(map.ancestors("Unknown", &live).is_none());
    }

    #[test]
    fn ancestors_detect_loops() {
        let mut map = ClassInheritanceMap::new();
        map.insert("A", "B");
        map.insert("B", "A");
        assert!(map.ancestors("A", &[]).is_none());
    }

    #[test]
    fn sub_classes_honor_exclusions() {
        let mut map = ClassInheritanceMap::new();
        map.insert("BP_Door_C", "Actor");
        map.insert("BP_Window_C", "Actor");
        map.insert("BP_SlidingDoor_C", "BP_Door_C");

        let live = vec![LiveClass::new("Actor", Some("Object")), LiveClass::new("Pawn", Some("Actor"))];

        let all = map.sub_classes(&["Actor".to_string()], &HashSet::new(), &live);
        assert_eq!(
            all,
            names(&["Actor", "Pawn", "BP_Door_C", "BP_Window_C", "BP_SlidingDoor_C"])
        );

        let without_doors = map.sub_classes(&["Actor".to_string()], &names(&["BP_Door_C"]), &live);
        assert_eq!(without_doors, names(&["Actor", "Pawn", "BP_Window_C"]));
    }

    #[test]
    fn sub_classes_terminate_on_cycles() {
        let mut map = ClassInheritanceMap::new();
        map.insert("A", "B");
        map.insert("B", "A");
        assert_eq!(map.sub_classes(&["A".to_string()], &HashSet::new(), &[]), names(&["A", "B"]));
    }
}
