// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Glob list resolution.
//!
//! Build the set of files to archive from a sequence of glob lists.
//!
//! # Include and Exclude Layers
//!
//! Glob lists alternate in meaning by position. Lists at an even index are
//! __include__ layers, lists at an odd index are __exclude__ layers. Each
//! layer is applied on top of everything before it, so a later exclude layer
//! removes files that were included earlier, and a later include layer can
//! bring back files that an earlier exclude layer removed:
//!
//! ```text
//! [["*"], ["sub/*"], ["sub/a.txt"]]
//!   include everything
//!          exclude all of sub/
//!                     bring back sub/a.txt
//! ```
//!
//! Relative patterns are expanded against the base directory, and keep their
//! base relative form in the resulting [`FileSet`]. Absolute patterns are
//! expanded from their own root, and keep their absolute form. The rename
//! planner relies on that difference to find absolute files that still need
//! a destination inside the archive.
//!
//! Any directory that a pattern matches is expanded into every file beneath
//! it. Directories are never entries of a file set by themselves.

use crate::{archive::fileset::FileSet, path::PathKey};

use glob::{GlobError, MatchOptions, Pattern, PatternError};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Meaning of a glob layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Include,
    Exclude,
}

impl Layer {
    /// Determine layer meaning from its position in the glob list sequence.
    pub fn from_position(position: usize) -> Self {
        if position % 2 == 0 {
            Self::Include
        } else {
            Self::Exclude
        }
    }
}

/// Resolve alternating include and exclude glob lists into a file set.
///
/// # Errors
///
/// - Return [`ResolveError::Pattern`] if a glob pattern is malformed.
/// - Return [`ResolveError::Glob`] if a matched directory cannot be read.
/// - Return [`ResolveError::Walk`] if a matched directory cannot be walked.
#[instrument(skip(base_dir, glob_lists), level = "debug")]
pub fn resolve<L, G>(base_dir: &PathKey, glob_lists: L) -> Result<FileSet>
where
    L: IntoIterator<Item = G>,
    G: IntoIterator<Item = String>,
{
    let mut fileset = FileSet::new();

    for (position, globs) in glob_lists.into_iter().enumerate() {
        let layer = Layer::from_position(position);
        for pattern in globs {
            let matched = expand_pattern(base_dir, &pattern)?;
            debug!("{layer:?} {pattern:?} matched {} files", matched.len());

            for path in matched {
                let key = PathKey::new(&path, base_dir.as_path());
                match layer {
                    Layer::Include => fileset.insert(key, path),
                    Layer::Exclude => {
                        fileset.remove(&key);
                    }
                }
            }
        }
    }

    Ok(fileset)
}

/// Resolve a single include list followed by a single exclude list.
///
/// # Errors
///
/// - Return [`ResolveError`] for the same reasons as [`resolve`].
pub fn resolve_include_exclude(
    base_dir: &PathKey,
    include: impl IntoIterator<Item = impl Into<String>>,
    exclude: impl IntoIterator<Item = impl Into<String>>,
) -> Result<FileSet> {
    let include = include.into_iter().map(Into::into).collect::<Vec<String>>();
    let exclude = exclude.into_iter().map(Into::into).collect::<Vec<String>>();
    resolve(base_dir, [include, exclude])
}

/// Expand one pattern into every file it reaches.
///
/// Returned paths are relative to the base directory for relative patterns,
/// and absolute for absolute patterns.
fn expand_pattern(base_dir: &PathKey, pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let pattern_path = Path::new(pattern);
    let (full_pattern, strip) = if pattern_path.has_root() {
        (pattern.to_string(), None)
    } else {
        let escaped = Pattern::escape(base_dir.as_path().to_string_lossy().as_ref());
        let relative = strip_current_dir(pattern_path);
        if relative.as_os_str().is_empty() {
            (escaped, Some(base_dir.as_path()))
        } else {
            (
                format!("{escaped}/{}", relative.to_string_lossy()),
                Some(base_dir.as_path()),
            )
        }
    };

    let matches = glob::glob_with(&full_pattern, options).map_err(|err| ResolveError::Pattern {
        source: err,
        pattern: pattern.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in matches {
        let entry = entry.map_err(|err| ResolveError::Glob {
            source: err,
            pattern: pattern.to_string(),
        })?;

        for file in expand_to_files(&entry)? {
            let file = match strip {
                Some(base) => file
                    .strip_prefix(base)
                    .map(Path::to_path_buf)
                    .unwrap_or(file),
                None => file,
            };
            files.push(file);
        }
    }

    Ok(files)
}

/// Expand path into itself if it is a file, or every file beneath it if it is
/// a directory.
fn expand_to_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = entry.map_err(|err| ResolveError::Walk {
            source: err,
            path: path.to_path_buf(),
        })?;

        // INVARIANT: Only files are archive entries, directories are implied.
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn strip_current_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Glob resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Glob pattern has invalid syntax.
    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        #[source]
        source: PatternError,
        pattern: String,
    },

    /// Directory reached by glob pattern cannot be read.
    #[error("failed to expand glob pattern {pattern:?}")]
    Glob {
        #[source]
        source: GlobError,
        pattern: String,
    },

    /// Matched directory cannot be walked.
    #[error("failed to walk directory {:?}", path.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ResolveError> = std::result::Result<T, E>;
