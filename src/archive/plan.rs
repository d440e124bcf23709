// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rename planning.
//!
//! Decide which resolved files go into the archive at their natural location,
//! and which must be copied into a staging tree first because a rename rule
//! gives them a different location inside the archive.
//!
//! # Rename Rules
//!
//! A __rename rule__ maps a source path to a destination path inside the
//! archive. The destination is always relative to the root of the archive.
//! The source may name a single file, or a directory whose files all move
//! under the destination while keeping their sub-path.
//!
//! Rules are applied in the order they are given. Once a rule consumes a
//! file, later rules no longer see it.
//!
//! # External Files
//!
//! Files that were included through an absolute pattern, or that resolve to a
//! location outside of the base directory, have no natural location inside
//! the archive. Each of them must be covered by a rename rule. Planning fails
//! before anything touches the file system otherwise.

use crate::{archive::fileset::FileSet, path::PathKey};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};

/// Rename rule as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "(PathBuf, PathBuf)", into = "(PathBuf, PathBuf)")]
pub struct RenamePair {
    /// File or directory to rename, relative to the base directory or
    /// absolute.
    pub source: PathBuf,

    /// Location inside the archive.
    pub destination: PathBuf,
}

impl RenamePair {
    /// Construct new rename pair.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl From<(PathBuf, PathBuf)> for RenamePair {
    fn from((source, destination): (PathBuf, PathBuf)) -> Self {
        Self::new(source, destination)
    }
}

impl From<RenamePair> for (PathBuf, PathBuf) {
    fn from(pair: RenamePair) -> Self {
        (pair.source, pair.destination)
    }
}

/// Kind of path a rename rule applies to.
///
/// Resolved once when the plan is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameSource {
    File(PathKey),
    Directory(PathKey),
}

/// Validated rename rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    pub source: RenameSource,
    pub destination: PathBuf,
    declared: PathBuf,
}

/// Instruction to copy one file into the staging tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInstruction {
    /// Absolute path of file to copy.
    pub source: PathBuf,

    /// Location inside the staging tree, and thus the archive.
    pub destination: PathBuf,
}

/// Partition of resolved files into direct and staged entries.
///
/// # Invariant
///
/// - No file is both a direct entry and a copy source.
/// - No copy destination collides with a direct entry or another copy
///   destination.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagingPlan {
    pub direct: FileSet,
    pub copies: Vec<CopyInstruction>,
}

/// Partition file set according to rename rules.
///
/// # Errors
///
/// - Return [`PlanError::AbsoluteDestination`] if a rename destination is not
///   relative.
/// - Return [`PlanError::EscapingDestination`] if a rename destination climbs
///   out of the archive root through `..`, or names the root itself.
/// - Return [`PlanError::UnrenamedExternalPath`] if an absolute or external
///   file has no rename rule covering it.
/// - Return [`PlanError::NotIncluded`] if a rename source is not part of the
///   file set.
/// - Return [`PlanError::DestinationConflict`] if two files would land on the
///   same location inside the archive.
#[instrument(skip(base_dir, fileset, renames), level = "debug")]
pub fn plan(base_dir: &PathKey, fileset: &FileSet, renames: &[RenamePair]) -> Result<StagingPlan> {
    let destinations = renames
        .iter()
        .map(|pair| archive_destination(&pair.destination))
        .collect::<Result<Vec<_>>>()?;

    let source_keys = renames
        .iter()
        .map(|pair| PathKey::new(&pair.source, base_dir.as_path()))
        .collect::<Vec<_>>();

    for (key, path) in fileset.iter() {
        if !is_external(base_dir, key, path) {
            continue;
        }

        if !source_keys.iter().any(|source| key.is_under(source)) {
            return Err(PlanError::UnrenamedExternalPath {
                path: path.to_path_buf(),
            });
        }
    }

    let rules = renames
        .iter()
        .zip(source_keys)
        .zip(destinations)
        .map(|((pair, key), destination)| classify(pair, key, destination))
        .collect::<Result<Vec<_>>>()?;

    let mut working = fileset.clone();
    let mut copies = Vec::new();
    for rule in &rules {
        apply_rule(rule, &mut working, &mut copies)?;
    }

    check_destinations(base_dir, &working, &copies)?;

    Ok(StagingPlan {
        direct: working,
        copies,
    })
}

fn is_external(base_dir: &PathKey, key: &PathKey, path: &Path) -> bool {
    path.is_absolute() || path.has_root() || !key.is_under(base_dir)
}

/// Validate rename destination, and strip it down to its normal segments.
fn archive_destination(destination: &Path) -> Result<PathBuf> {
    let mut normal = PathBuf::new();
    for component in destination.components() {
        match component {
            Component::Normal(segment) => normal.push(segment),
            Component::CurDir => {}
            Component::Prefix(_) | Component::RootDir => {
                return Err(PlanError::AbsoluteDestination {
                    destination: destination.to_path_buf(),
                });
            }
            Component::ParentDir => {
                return Err(PlanError::EscapingDestination {
                    destination: destination.to_path_buf(),
                });
            }
        }
    }

    // INVARIANT: A rename must name a location, not the archive root itself.
    if normal.as_os_str().is_empty() {
        return Err(PlanError::EscapingDestination {
            destination: destination.to_path_buf(),
        });
    }

    Ok(normal)
}

fn classify(pair: &RenamePair, key: PathKey, destination: PathBuf) -> Result<RenameRule> {
    let metadata = fs::metadata(key.as_path()).map_err(|_| PlanError::NotIncluded {
        source_path: pair.source.clone(),
    })?;

    let source = if metadata.is_dir() {
        RenameSource::Directory(key)
    } else {
        RenameSource::File(key)
    };

    Ok(RenameRule {
        source,
        destination,
        declared: pair.source.clone(),
    })
}

fn apply_rule(
    rule: &RenameRule,
    working: &mut FileSet,
    copies: &mut Vec<CopyInstruction>,
) -> Result<()> {
    let not_included = || PlanError::NotIncluded {
        source_path: rule.declared.clone(),
    };

    match &rule.source {
        RenameSource::File(key) => {
            working.remove(key).ok_or_else(not_included)?;
            debug!("rename {key} to {:?}", rule.destination.display());
            copies.push(CopyInstruction {
                source: key.as_path().to_path_buf(),
                destination: rule.destination.clone(),
            });
        }
        RenameSource::Directory(dir) => {
            let consumed = working
                .iter()
                .filter_map(|(key, _)| key.relative_to(dir).map(|sub| (key.clone(), sub)))
                .collect::<Vec<_>>();

            if consumed.is_empty() {
                return Err(not_included());
            }

            debug!(
                "rename {} files under {dir} to {:?}",
                consumed.len(),
                rule.destination.display()
            );
            for (key, sub_path) in consumed {
                working.remove(&key);
                copies.push(CopyInstruction {
                    source: key.as_path().to_path_buf(),
                    destination: rule.destination.join(sub_path),
                });
            }
        }
    }

    Ok(())
}

fn check_destinations(
    base_dir: &PathKey,
    direct: &FileSet,
    copies: &[CopyInstruction],
) -> Result<()> {
    let mut seen = HashSet::new();
    for copy in copies {
        let key = PathKey::new(&copy.destination, base_dir.as_path());
        if direct.contains(&key) || !seen.insert(key) {
            return Err(PlanError::DestinationConflict {
                destination: copy.destination.clone(),
            });
        }
    }

    Ok(())
}

/// Rename planning error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Rename destination is not relative to the archive root.
    #[error("can only rename to a path relative to the archive root, got {:?}", destination.display())]
    AbsoluteDestination { destination: PathBuf },

    /// Rename destination leaves the archive root, or names the root itself.
    #[error("rename destination {:?} must stay below the archive root", destination.display())]
    EscapingDestination { destination: PathBuf },

    /// Absolute or external file lacks a rename rule.
    #[error(
        "absolute or external path {:?} is included, but has no rename rule giving it a relative destination",
        path.display()
    )]
    UnrenamedExternalPath { path: PathBuf },

    /// Rename source is not part of the resolved file set.
    #[error("cannot rename {:?}, path is not included for archiving", source_path.display())]
    NotIncluded { source_path: PathBuf },

    /// Two files map to one location inside the archive.
    #[error("more than one file would be archived at {:?}", destination.display())]
    DestinationConflict { destination: PathBuf },
}

impl PlanError {
    /// Check if error stems from an invalid rename configuration rather than
    /// from the state of the file set.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AbsoluteDestination { .. }
                | Self::EscapingDestination { .. }
                | Self::UnrenamedExternalPath { .. }
        )
    }
}

/// Friendly result alias :3
pub type Result<T, E = PlanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::resolve::resolve_include_exclude;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> anyhow::Result<(TempDir, PathKey)> {
        let root = TempDir::new()?;
        for file in files {
            let path = root.path().join(file);
            create_dir_all(path.parent().unwrap())?;
            write(path, file.as_bytes())?;
        }
        let base = PathKey::try_new_dir(root.path())?;
        Ok((root, base))
    }

    fn direct(plan: &StagingPlan) -> Vec<String> {
        plan.direct.paths().map(crate::path::to_slash).collect()
    }

    fn destinations(plan: &StagingPlan) -> Vec<String> {
        plan.copies
            .iter()
            .map(|copy| crate::path::to_slash(&copy.destination))
            .collect()
    }

    const SAMPLE: &[&str] = &[
        "1/i/a.txt",
        "1/i/b.txt",
        "1/ii.txt",
        "1/iii/c.txt",
        "2/i/d.txt",
        "2/ii/e.txt",
    ];

    #[test]
    fn plan_expands_directory_rename() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], Vec::<String>::new())?;

        let plan = plan(&base, &files, &[RenamePair::new("2", "3")])?;

        assert_eq!(destinations(&plan), vec!["3/i/d.txt", "3/ii/e.txt"]);
        assert_eq!(
            direct(&plan),
            vec!["1/i/a.txt", "1/i/b.txt", "1/ii.txt", "1/iii/c.txt"]
        );
        assert_eq!(plan.copies[0].source, base.as_path().join("2").join("i").join("d.txt"));

        Ok(())
    }

    #[test]
    fn plan_renames_single_file() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["1"], Vec::<String>::new())?;

        let plan = plan(&base, &files, &[RenamePair::new("1/ii.txt", "docs/two.txt")])?;

        assert_eq!(destinations(&plan), vec!["docs/two.txt"]);
        assert_eq!(direct(&plan), vec!["1/i/a.txt", "1/i/b.txt", "1/iii/c.txt"]);

        Ok(())
    }

    #[test]
    fn plan_rejects_absolute_path_without_rename() -> anyhow::Result<()> {
        let (_root, base) = tree(&["a.txt"])?;
        let (_other, outside) = tree(&["python/python.exe"])?;
        let interpreter = outside.as_path().join("python").join("python.exe");
        let files = resolve_include_exclude(
            &base,
            ["a.txt".to_string(), interpreter.to_string_lossy().into_owned()],
            Vec::<String>::new(),
        )?;

        let result = plan(&base, &files, &[]);

        match result {
            Err(error @ PlanError::UnrenamedExternalPath { .. }) => assert!(error.is_configuration()),
            other => panic!("expected unrenamed external path error, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn plan_accepts_absolute_path_covered_by_directory_rename() -> anyhow::Result<()> {
        let (_root, base) = tree(&["a.txt"])?;
        let (_other, outside) = tree(&["python/python.exe", "python/lib/os.py"])?;
        let runtime = outside.as_path().join("python");
        let files = resolve_include_exclude(
            &base,
            ["a.txt".to_string(), runtime.to_string_lossy().into_owned()],
            Vec::<String>::new(),
        )?;

        let plan = plan(&base, &files, &[RenamePair::new(&runtime, "runtime")])?;

        assert_eq!(direct(&plan), vec!["a.txt"]);
        assert_eq!(
            destinations(&plan),
            vec!["runtime/lib/os.py", "runtime/python.exe"]
        );

        Ok(())
    }

    #[test]
    fn plan_prefix_match_respects_segments() -> anyhow::Result<()> {
        let (_root, base) = tree(&["a.txt"])?;
        let (_other, outside) = tree(&["foo/bar/x.txt", "foo/barbaz/y.txt"])?;
        let files = resolve_include_exclude(
            &base,
            [outside.as_path().join("foo").to_string_lossy().into_owned()],
            Vec::<String>::new(),
        )?;

        let result = plan(
            &base,
            &files,
            &[RenamePair::new(outside.as_path().join("foo").join("bar"), "bar")],
        );

        assert!(matches!(result, Err(PlanError::UnrenamedExternalPath { .. })));

        Ok(())
    }

    #[test]
    fn plan_rejects_absolute_destination() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], Vec::<String>::new())?;
        let absolute = base.as_path().join("elsewhere");

        let result = plan(&base, &files, &[RenamePair::new("2", absolute)]);

        assert!(matches!(result, Err(PlanError::AbsoluteDestination { .. })));

        Ok(())
    }

    #[test]
    fn plan_rejects_destination_outside_archive_root() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], Vec::<String>::new())?;

        for destination in ["../escaped.txt", "docs/../../escaped.txt", ".", "./"] {
            let result = plan(&base, &files, &[RenamePair::new("1/ii.txt", destination)]);
            match result {
                Err(error @ PlanError::EscapingDestination { .. }) => {
                    assert!(error.is_configuration())
                }
                other => panic!("expected escaping destination for {destination:?}, got {other:?}"),
            }
        }

        let plan = plan(&base, &files, &[RenamePair::new("1/ii.txt", "./docs/./two.txt")])?;
        assert_eq!(destinations(&plan), vec!["docs/two.txt"]);

        Ok(())
    }

    #[test]
    fn plan_rejects_directory_rename_matching_nothing() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], ["2"])?;

        let result = plan(&base, &files, &[RenamePair::new("2", "3")]);

        match result {
            Err(PlanError::NotIncluded { source_path }) => {
                assert_eq!(source_path, PathBuf::from("2"))
            }
            other => panic!("expected not included error, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn plan_rejects_rename_of_excluded_path() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], ["2/ii/e.txt"])?;

        let result = plan(&base, &files, &[RenamePair::new("2/ii/e.txt", "e.txt")]);
        match result {
            Err(error @ PlanError::NotIncluded { .. }) => assert!(!error.is_configuration()),
            other => panic!("expected not included error, got {other:?}"),
        }

        let result = plan(&base, &files, &[RenamePair::new("missing.txt", "e.txt")]);
        assert!(matches!(result, Err(PlanError::NotIncluded { .. })));

        Ok(())
    }

    #[test]
    fn plan_first_matching_rule_wins() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["2"], Vec::<String>::new())?;

        let plan = plan(
            &base,
            &files,
            &[RenamePair::new("2/i", "first"), RenamePair::new("2", "second")],
        )?;

        assert_eq!(destinations(&plan), vec!["first/d.txt", "second/ii/e.txt"]);
        assert!(plan.direct.is_empty());

        Ok(())
    }

    #[test]
    fn plan_rejects_destination_conflict() -> anyhow::Result<()> {
        let (_root, base) = tree(SAMPLE)?;
        let files = resolve_include_exclude(&base, ["*"], Vec::<String>::new())?;

        let result = plan(&base, &files, &[RenamePair::new("2/i/d.txt", "1/ii.txt")]);

        assert!(matches!(result, Err(PlanError::DestinationConflict { .. })));

        Ok(())
    }
}
