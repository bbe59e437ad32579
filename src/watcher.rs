use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub filename: PathBuf,
    pub action: FileAction,
}

impl FileChange {
    pub fn new(filename: impl Into<PathBuf>, action: FileAction) -> Self {
        Self {
            filename: filename.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

pub type DirectoryChangedCallback = Box<dyn Fn(&[FileChange]) + Send + Sync>;

/// Platform change notification backend. Callbacks may fire on any thread.
pub trait DirectoryWatcher: Send + Sync {
    fn register_directory_changed(&self, directory: &Path, callback: DirectoryChangedCallback) -> Option<WatchHandle>;

    fn unregister_directory_changed(&self, directory: &Path, handle: WatchHandle) -> bool;
}

/// Turns every `Removed` that is later followed by an `Added` of the same
/// file into a single `Modified` at the position of the `Added`.
pub fn collapse_file_changes(changes: &[FileChange]) -> Vec<FileChange> {
    let mut collapsed: Vec<FileChange> = Vec::with_capacity(changes.len());

    for change in changes {
        if change.action == FileAction::Added {
            let removed = collapsed
                .iter()
                .rposition(|prev| prev.action == FileAction::Removed && prev.filename == change.filename);
            if let Some(idx) = removed {
                collapsed.remove(idx);
                collapsed.push(FileChange::new(change.filename.clone(), FileAction::Modified));
                continue;
            }
        }
        collapsed.push(change.clone());
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_then_added_becomes_modified() {
        let changes = vec![
            FileChange::new("Content/A.uasset", FileAction::Removed),
            FileChange::new("Content/B.uasset", FileAction::Added),
            FileChange::new("Content/A.uasset", FileAction::Added),
        ];

        assert_eq!(
            collapse_file_changes(&changes),
            vec![
                FileChange::new("Content/B.uasset", FileAction::Added),
                FileChange::new("Content/A.uasset", FileAction::Modified),
            ]
        );
    }

    #[test]
    fn added_then_removed_is_kept() {
        let changes = vec![
            FileChange::new("Content/A.uasset", FileAction::Added),
            FileChange::new("Content/A.uasset", FileAction::Removed),
        ];
        assert_eq!(collapse_file_changes(&changes), changes);
    }
}
