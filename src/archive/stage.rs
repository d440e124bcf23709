// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staging tree materialization.
//!
//! Copy every renamed file into a shadow directory laid out exactly the way
//! those files should appear inside the archive. Direct files that are
//! currently locked by another process get the same treatment at their
//! natural location, so the archiver can read the copy instead.

use crate::{
    archive::{fileset::FileSet, plan::StagingPlan},
    lock::LockDetector,
    path::PathKey,
};

use filetime::{set_file_times, FileTime};
use std::{
    fs::{copy, create_dir_all, metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Result of materializing a staging plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedFiles {
    /// Files left to archive from the base directory.
    pub direct: FileSet,

    /// Paths placed inside the staging directory, relative to it, in copy
    /// order.
    pub staged: Vec<PathBuf>,
}

impl StagedFiles {
    /// Direct files relative to the base directory.
    pub fn direct_paths(&self, base_dir: &PathKey) -> Vec<PathBuf> {
        self.direct
            .iter()
            .map(|(key, path)| key.relative_to(base_dir).unwrap_or_else(|| path.to_path_buf()))
            .collect()
    }
}

/// Copy staged files of plan into `stage_dir`.
///
/// # Errors
///
/// - Return [`StageError::CreateDir`] if a parent directory cannot be made.
/// - Return [`StageError::Copy`] if a file cannot be copied.
/// - Return [`StageError::Timestamps`] if timestamps cannot be carried over.
#[instrument(skip(plan, base_dir, stage_dir, detector), level = "debug")]
pub fn materialize(
    plan: StagingPlan,
    base_dir: &PathKey,
    stage_dir: &Path,
    detector: &impl LockDetector,
) -> Result<StagedFiles> {
    let StagingPlan { mut direct, copies } = plan;
    let mut staged = Vec::with_capacity(copies.len());

    for instruction in copies {
        copy_preserving_times(&instruction.source, &stage_dir.join(&instruction.destination))?;
        staged.push(instruction.destination);
    }

    let locked = direct
        .iter()
        .filter(|(key, _)| detector.is_locked(key.as_path()))
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();

    if !locked.is_empty() {
        warn!(
            "{} files are locked by another process, archiving copies instead",
            locked.len()
        );
    }

    for key in locked {
        let Some(stored) = direct.remove(&key) else {
            continue;
        };

        let relative = key.relative_to(base_dir).unwrap_or(stored);
        debug!("stage locked file {:?}", relative.display());
        copy_preserving_times(key.as_path(), &stage_dir.join(&relative))?;
        staged.push(relative);
    }

    Ok(StagedFiles { direct, staged })
}

fn copy_preserving_times(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        create_dir_all(parent).map_err(|err| StageError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    copy(source, destination).map_err(|err| StageError::Copy {
        source: err,
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
    })?;

    let timestamps = metadata(source).and_then(|meta| {
        let accessed = FileTime::from_last_access_time(&meta);
        let modified = FileTime::from_last_modification_time(&meta);
        set_file_times(destination, accessed, modified)
    });

    timestamps.map_err(|err| StageError::Timestamps {
        source: err,
        path: destination.to_path_buf(),
    })
}

/// Staging error types.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Directory inside staging tree cannot be created.
    #[error("failed to create staging directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied into staging tree.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Timestamps of copied file cannot be set.
    #[error("failed to carry timestamps over to {:?}", path.display())]
    Timestamps {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StageError> = std::result::Result<T, E>;
