// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Insertion ordered file set.

use crate::path::PathKey;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Ordered mapping of path keys to paths as they were encountered.
///
/// # Invariant
///
/// - Iteration follows first insertion order of each live key.
/// - Inserting a live key overwrites its path, but keeps its position.
/// - Inserting a key after it was removed places it at the end.
#[derive(Debug, Default, Clone)]
pub struct FileSet {
    entries: Vec<Option<(PathKey, PathBuf)>>,
    index: HashMap<PathKey, usize>,
}

impl FileSet {
    /// Construct new empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert path under key, overwriting the path of a live key.
    pub fn insert(&mut self, key: PathKey, path: impl Into<PathBuf>) {
        let path = path.into();
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = Some((key, path)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(Some((key, path)));
            }
        }
    }

    /// Remove key, returning its path if it was present.
    pub fn remove(&mut self, key: &PathKey) -> Option<PathBuf> {
        let slot = self.index.remove(key)?;
        self.entries[slot].take().map(|(_, path)| path)
    }

    /// Lookup path stored under key.
    pub fn get(&self, key: &PathKey) -> Option<&Path> {
        self.index
            .get(key)
            .and_then(|&slot| self.entries[slot].as_ref())
            .map(|(_, path)| path.as_path())
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate over live entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathKey, &Path)> {
        self.entries
            .iter()
            .flatten()
            .map(|(key, path)| (key, path.as_path()))
    }

    /// Iterate over stored paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.iter().map(|(_, path)| path)
    }
}

impl PartialEq for FileSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for FileSet {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(path: &str) -> PathKey {
        PathKey::new(path, "/base")
    }

    fn listing(set: &FileSet) -> Vec<String> {
        set.paths().map(|path| path.display().to_string()).collect()
    }

    #[test]
    fn file_set_overwrite_keeps_position() {
        let mut set = FileSet::new();
        set.insert(key("a.txt"), "a.txt");
        set.insert(key("b.txt"), "b.txt");
        set.insert(key("A.TXT"), "A.TXT");

        assert_eq!(listing(&set), vec!["A.TXT", "b.txt"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn file_set_reinsert_after_remove_moves_to_end() {
        let mut set = FileSet::new();
        set.insert(key("a.txt"), "a.txt");
        set.insert(key("b.txt"), "b.txt");
        set.insert(key("c.txt"), "c.txt");

        assert_eq!(set.remove(&key("a.txt")), Some(PathBuf::from("a.txt")));
        assert_eq!(set.remove(&key("a.txt")), None);
        set.insert(key("a.txt"), "a.txt");

        assert_eq!(listing(&set), vec!["b.txt", "c.txt", "a.txt"]);
    }

    #[test]
    fn file_set_remove_preserves_order() {
        let mut set = FileSet::new();
        for name in ["1.txt", "2.log", "3.txt", "4.log"] {
            set.insert(key(name), name);
        }

        assert_eq!(set.remove(&key("2.LOG")), Some(PathBuf::from("2.log")));
        assert_eq!(set.remove(&key("4.log")), Some(PathBuf::from("4.log")));
        assert_eq!(set.remove(&key("4.log")), None);

        assert_eq!(listing(&set), vec!["1.txt", "3.txt"]);
        assert!(set.contains(&key("3.TXT")));
        assert_eq!(set.get(&key("2.log")), None);
    }
}
