// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path identity utilities.
//!
//! Determine a stable identity for files that flow through the archive
//! pipeline, so that the same file reached through different spellings is
//! treated as one entry.
//!
//! # Path Keys
//!
//! A __path key__ is an absolute, resolved, case folded form of a path. The
//! packaging tool this crate serves targets Windows, where `Bin\App.exe` and
//! `bin/app.exe` name the same file. Keys keep that behavior on case
//! sensitive file systems too, so an include list and a rename list always
//! agree on which file they talk about.
//!
//! Resolution follows these steps:
//!
//! 1. Relative paths are joined onto a base directory.
//! 2. Paths that exist are canonicalized, resolving symlinks and junctions.
//!    Paths that do not exist are normalized lexically instead.
//! 3. Separators become `/`, trailing separators are dropped, and the whole
//!    string is lowercased.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    hash::{Hash, Hasher},
    path::{Component, Path, PathBuf},
};

/// Case folded identity of a file system path.
///
/// Equality, ordering, and hashing only look at the folded key. The resolved
/// path keeps its original case so it can still be used for file I/O and for
/// computing archive relative locations.
#[derive(Clone, Debug)]
pub struct PathKey {
    key: String,
    resolved: PathBuf,
}

impl PathKey {
    /// Construct new path key.
    ///
    /// Relative paths are interpreted relative to `base_dir`.
    pub fn new(path: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.as_ref().join(path)
        };

        let resolved = match fs::canonicalize(&joined) {
            Ok(canonical) => strip_verbatim(canonical),
            Err(_) => normalize_lexically(&joined),
        };

        Self {
            key: fold(&resolved),
            resolved,
        }
    }

    /// Construct path key for a directory that must exist.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::MissingDirectory`] if `dir` cannot be resolved
    ///   or is not a directory.
    pub fn try_new_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let absolute = std::path::absolute(dir).map_err(|err| PathError::MissingDirectory {
            source: err,
            path: dir.to_path_buf(),
        })?;
        let canonical = fs::canonicalize(&absolute).map_err(|err| PathError::MissingDirectory {
            source: err,
            path: dir.to_path_buf(),
        })?;

        if !canonical.is_dir() {
            return Err(PathError::MissingDirectory {
                source: std::io::Error::other("not a directory"),
                path: dir.to_path_buf(),
            });
        }

        let resolved = strip_verbatim(canonical);
        Ok(Self {
            key: fold(&resolved),
            resolved,
        })
    }

    /// Folded string form used for identity.
    pub fn as_str(&self) -> &str {
        self.key.as_str()
    }

    /// Resolved absolute path with original case.
    pub fn as_path(&self) -> &Path {
        self.resolved.as_path()
    }

    /// Check if this key names `parent` itself, or anything inside it.
    ///
    /// Matching is done per path segment, so `foo/barbaz` is not considered
    /// to be under `foo/bar`.
    pub fn is_under(&self, parent: &PathKey) -> bool {
        if self.key == parent.key {
            return true;
        }

        let prefix = format!("{}/", parent.key.trim_end_matches('/'));
        self.key.starts_with(prefix.as_str())
    }

    /// Path of this key relative to `parent`.
    ///
    /// Returns `None` if this key is not under `parent`. The relative path
    /// keeps the original case of this key's resolved path.
    pub fn relative_to(&self, parent: &PathKey) -> Option<PathBuf> {
        if !self.is_under(parent) {
            return None;
        }

        let depth = parent.resolved.components().count();
        Some(self.resolved.components().skip(depth).collect())
    }
}

impl PartialEq for PathKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PathKey {}

impl Hash for PathKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for PathKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Display for PathKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.key.as_str())
    }
}

/// Render path with forward slashes.
///
/// Archivers take list files in this form regardless of host platform.
pub fn to_slash(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter_map(|component| match component {
            Component::CurDir => None,
            Component::RootDir => Some(String::new()),
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

fn fold(path: &Path) -> String {
    let mut key = path.to_string_lossy().replace('\\', "/").to_lowercase();

    // INVARIANT: Keep root separator, drop every other trailing separator.
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }

    key
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    // Canonical paths come back as `\\?\C:\...`, and UNC shares as
    // `\\?\UNC\server\share`.
    let text = path.to_string_lossy().into_owned();
    if let Some(unc) = text.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{unc}"));
    }

    match text.strip_prefix(r"\\?\") {
        Some(disk) => PathBuf::from(disk),
        None => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// Base directory cannot be resolved.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Directory does not exist, or is not a directory.
    #[error("cannot resolve directory {:?}", path.display())]
    MissingDirectory {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
