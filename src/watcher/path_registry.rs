//! Registry of the paths a watch server currently watches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Set of watched roots.
///
/// Each root appears at most once. The server keeps the registry behind a
/// lock; every add or remove is a single critical section, so a concurrent
/// snapshot sees the set either before or after the change.
#[derive(Debug, Default)]
pub struct PathRegistry {
    paths: HashSet<PathBuf>,
}

impl PathRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path. Returns `false` if it was already present.
    pub fn add(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    /// Remove a path. Returns `false` if it was not present.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.paths.remove(path)
    }

    /// Check if a path is in the registry.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Find the watched root that covers `path`.
    ///
    /// With `recursive` any ancestor root matches; otherwise only the path
    /// itself or its direct parent does. The longest matching root wins.
    pub fn owning_root(&self, path: &Path, recursive: bool) -> Option<&Path> {
        self.paths
            .iter()
            .filter(|root| {
                if recursive {
                    path.starts_with(root.as_path())
                } else {
                    path == root.as_path() || path.parent() == Some(root.as_path())
                }
            })
            .max_by_key(|root| root.as_os_str().len())
            .map(PathBuf::as_path)
    }

    /// Copy of the current set, sorted for stable output.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Get count of tracked paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every path, returning what was registered.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.paths.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_registry_basic() {
        let mut registry = PathRegistry::new();

        assert!(registry.add(PathBuf::from("/project/src")));
        assert!(registry.add(PathBuf::from("/project/tests")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(Path::new("/project/src")));
        assert!(!registry.contains(Path::new("/project")));
    }

    #[test]
    fn test_path_registry_uniqueness() {
        let mut registry = PathRegistry::new();

        let path = PathBuf::from("/project/src");

        assert!(registry.add(path.clone()));
        // Second add is rejected
        assert!(!registry.add(path.clone()));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_path_registry_remove() {
        let mut registry = PathRegistry::new();

        let path = PathBuf::from("/project/src");
        registry.add(path.clone());

        assert!(registry.remove(&path));
        assert!(!registry.contains(&path));
        assert!(registry.is_empty());

        // Removing again is a no-op
        assert!(!registry.remove(&path));
    }

    #[test]
    fn test_owning_root_non_recursive() {
        let mut registry = PathRegistry::new();
        registry.add(PathBuf::from("/tmp/a"));

        let root = registry.owning_root(Path::new("/tmp/a/file.txt"), false);
        assert_eq!(root, Some(Path::new("/tmp/a")));

        let root = registry.owning_root(Path::new("/tmp/a"), false);
        assert_eq!(root, Some(Path::new("/tmp/a")));

        // Grandchildren are not covered without recursion
        assert!(
            registry
                .owning_root(Path::new("/tmp/a/sub/file.txt"), false)
                .is_none()
        );
    }

    #[test]
    fn test_owning_root_recursive_prefers_longest() {
        let mut registry = PathRegistry::new();
        registry.add(PathBuf::from("/tmp/a"));
        registry.add(PathBuf::from("/tmp/a/sub"));

        let root = registry.owning_root(Path::new("/tmp/a/sub/deep/file.txt"), true);
        assert_eq!(root, Some(Path::new("/tmp/a/sub")));

        // Sibling with a shared string prefix is not inside the root
        assert!(registry.owning_root(Path::new("/tmp/ab/file"), true).is_none());
    }

    #[test]
    fn test_snapshot_and_drain() {
        let mut registry = PathRegistry::new();
        registry.add(PathBuf::from("/b"));
        registry.add(PathBuf::from("/a"));

        assert_eq!(
            registry.snapshot(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );

        let mut drained = registry.drain();
        drained.sort();
        assert_eq!(drained, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(registry.is_empty());
    }
}
