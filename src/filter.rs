use std::collections::HashSet;

/// Describes which assets a query should return. Each non-empty dimension
/// narrows the result; within a dimension any listed value matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub package_names: Vec<String>,
    pub package_paths: Vec<String>,
    pub object_paths: Vec<String>,
    pub class_names: Vec<String>,
    pub tags_and_values: Vec<(String, String)>,
    pub recursive_classes_exclusion_set: HashSet<String>,
    pub recursive_paths: bool,
    pub recursive_classes: bool,
    pub include_only_on_disk_assets: bool,
}

impl AssetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package_name(mut self, package_name: &str) -> Self {
        self.package_names.push(package_name.to_string());
        self
    }

    pub fn package_path(mut self, package_path: &str) -> Self {
        self.package_paths.push(package_path.to_string());
        self
    }

    pub fn object_path(mut self, object_path: &str) -> Self {
        self.object_paths.push(object_path.to_string());
        self
    }

    pub fn class_name(mut self, class_name: &str) -> Self {
        self.class_names.push(class_name.to_string());
        self
    }

    pub fn tag(mut self, tag: &str, value: &str) -> Self {
        self.tags_and_values.push((tag.to_string(), value.to_string()));
        self
    }

    pub fn recursive_paths(mut self, recursive: bool) -> Self {
        self.recursive_paths = recursive;
        self
    }

    pub fn recursive_classes(mut self, recursive: bool) -> Self {
        self.recursive_classes = recursive;
        self
    }

    pub fn exclude_class(mut self, class_name: &str) -> Self {
        self.recursive_classes_exclusion_set
            .insert(class_name.to_string());
        self
    }

    pub fn on_disk_only(mut self, on_disk_only: bool) -> Self {
        self.include_only_on_disk_assets = on_disk_only;
        self
    }

    /// False if any listed name is empty.
    pub fn is_valid(&self) -> bool {
        let names = self
            .package_names
            .iter()
            .chain(&self.package_paths)
            .chain(&self.object_paths)
            .chain(&self.class_names)
            .chain(self.tags_and_values.iter().map(|(tag, _)| tag));

        names.into_iter().all(|name| !name.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.package_names.is_empty()
            && self.package_paths.is_empty()
            && self.object_paths.is_empty()
            && self.class_names.is_empty()
            && self.tags_and_values.is_empty()
    }

    /// True if `value` equals the filter's value for any tag listed.
    pub fn matches_tags<'a, F>(&self, mut lookup: F) -> bool
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        self.tags_and_values
            .iter()
            .any(|(tag, value)| lookup(tag) == Some(value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_names() {
        assert!(AssetFilter::new().package_name("/Game/A").is_valid());
        assert!(!AssetFilter::new().package_name("").is_valid());
        assert!(!AssetFilter::new().package_path("").is_valid());
        assert!(!AssetFilter::new().object_path("").is_valid());
        assert!(!AssetFilter::new().class_name("").is_valid());
        assert!(!AssetFilter::new().tag("", "value").is_valid());
        assert!(AssetFilter::new().tag("Key", "").is_valid());
    }

    #[test]
    fn emptiness_ignores_flags() {
        assert!(AssetFilter::new().recursive_paths(true).on_disk_only(true).is_empty());
        assert!(!AssetFilter::new().class_name("Texture2D").is_empty());
    }

    #[test]
    fn any_tag_pair_matches() {
        let filter = AssetFilter::new().tag("Format", "DXT1").tag("Width", "64");
        assert!(filter.matches_tags(|tag| (tag == "Width").then_some("64")));
        assert!(!filter.matches_tags(|tag| (tag == "Format").then_some("BC7")));
    }
}
