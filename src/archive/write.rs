// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive writing.
//!
//! An archive is written in up to two archiver passes against the same output
//! path. The first pass adds direct files from the base directory. The second
//! pass appends staged files from the staging directory. The first pass
//! always runs before the second, so an archive left behind by a failed build
//! never holds staged files without the direct files they belong with.

use crate::archiver::{AddRequest, Archiver, ArchiverError, CompressionMode};

use std::{
    fs::remove_file,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Everything needed to write one archive.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    /// Absolute path of archive to write.
    pub output: &'a Path,

    /// Base directory of direct files.
    pub base_dir: &'a Path,

    /// Direct files relative to base directory.
    pub direct: &'a [PathBuf],

    /// Staging directory.
    pub stage_dir: &'a Path,

    /// Staged files relative to staging directory.
    pub staged: &'a [PathBuf],

    /// Compression to apply in both passes.
    pub mode: &'a CompressionMode,

    /// Keep existing archive at output path, and add to it.
    pub append: bool,
}

/// Write archive through archiver.
///
/// # Errors
///
/// - Return [`WriteError::RemoveOutput`] if an existing archive cannot be
///   removed when not appending.
/// - Return [`WriteError::Archiver`] if either archiver pass fails.
#[instrument(skip(request, archiver), level = "debug")]
pub fn write(request: &WriteRequest<'_>, archiver: &impl Archiver) -> Result<()> {
    if !request.append {
        remove_output(request.output)?;
    }

    if request.direct.is_empty() && request.staged.is_empty() {
        warn!("nothing to archive into {:?}", request.output.display());
        return Ok(());
    }

    if !request.direct.is_empty() {
        info!(
            "archive {} files into {:?}",
            request.direct.len(),
            request.output.display()
        );
        archiver.add(&AddRequest {
            output: request.output,
            working_dir: request.base_dir,
            files: request.direct,
            mode: request.mode,
            append: request.append,
        })?;
    }

    if !request.staged.is_empty() {
        info!(
            "archive {} staged files into {:?}",
            request.staged.len(),
            request.output.display()
        );

        // INVARIANT: Staged files are always appended, the first pass or the
        //   caller already decided the fate of any existing archive.
        archiver.add(&AddRequest {
            output: request.output,
            working_dir: request.stage_dir,
            files: request.staged,
            mode: request.mode,
            append: true,
        })?;
    }

    Ok(())
}

fn remove_output(output: &Path) -> Result<()> {
    match remove_file(output) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WriteError::RemoveOutput {
            source: err,
            path: output.to_path_buf(),
        }),
    }
}

/// Archive writing error types.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Existing archive cannot be removed.
    #[error("failed to remove existing archive {:?}", path.display())]
    RemoveOutput {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archiver pass failed.
    #[error(transparent)]
    Archiver(#[from] ArchiverError),
}

/// Friendly result alias :3
pub type Result<T, E = WriteError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, fs::write as write_file};
    use tempfile::TempDir;

    /// Single archiver call as seen by [`RecordingArchiver`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Call {
        pub(crate) output: PathBuf,
        pub(crate) working_dir: PathBuf,
        pub(crate) files: Vec<PathBuf>,
        pub(crate) append: bool,
        pub(crate) existing: Vec<bool>,
    }

    /// Archiver that only records what it was asked to do.
    ///
    /// Also notes whether each file exists at call time, so callers can check
    /// the staging tree was in place before the archiver ran.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingArchiver {
        pub(crate) calls: RefCell<Vec<Call>>,
    }

    impl Archiver for RecordingArchiver {
        fn add(&self, request: &AddRequest<'_>) -> crate::archiver::Result<()> {
            self.calls.borrow_mut().push(Call {
                output: request.output.to_path_buf(),
                working_dir: request.working_dir.to_path_buf(),
                files: request.files.to_vec(),
                append: request.append,
                existing: request
                    .files
                    .iter()
                    .map(|file| request.working_dir.join(file).is_file())
                    .collect(),
            });
            Ok(())
        }

        fn extract(&self, _archive: &Path, _destination: &Path) -> crate::archiver::Result<()> {
            Ok(())
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn write_runs_direct_pass_then_appending_staged_pass() -> anyhow::Result<()> {
        let base = TempDir::new()?;
        let stage = TempDir::new()?;
        let output = base.path().join("app.7z");
        let direct = paths(&["1/ii.txt"]);
        let staged = paths(&["3/i/d.txt"]);
        let archiver = RecordingArchiver::default();

        write(
            &WriteRequest {
                output: &output,
                base_dir: base.path(),
                direct: &direct,
                stage_dir: stage.path(),
                staged: &staged,
                mode: &CompressionMode::Store,
                append: false,
            },
            &archiver,
        )?;

        let calls = archiver.calls.into_inner();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].output, output);
        assert_eq!(calls[1].output, output);
        assert_eq!(calls[0].working_dir, base.path());
        assert_eq!(calls[1].working_dir, stage.path());
        assert_eq!(calls[0].files, direct);
        assert_eq!(calls[1].files, staged);
        assert!(!calls[0].append);
        assert!(calls[1].append);

        Ok(())
    }

    #[test]
    fn write_skips_staged_pass_without_staged_files() -> anyhow::Result<()> {
        let base = TempDir::new()?;
        let stage = TempDir::new()?;
        let output = base.path().join("app.7z");
        let direct = paths(&["a.txt", "b.txt"]);
        let archiver = RecordingArchiver::default();

        write(
            &WriteRequest {
                output: &output,
                base_dir: base.path(),
                direct: &direct,
                stage_dir: stage.path(),
                staged: &[],
                mode: &CompressionMode::Lzma2(Default::default()),
                append: true,
            },
            &archiver,
        )?;

        let calls = archiver.calls.into_inner();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].append);

        Ok(())
    }

    #[test]
    fn write_replaces_existing_archive_unless_appending() -> anyhow::Result<()> {
        let base = TempDir::new()?;
        let output = base.path().join("app.7z");
        let archiver = RecordingArchiver::default();
        let request = WriteRequest {
            output: &output,
            base_dir: base.path(),
            direct: &[],
            stage_dir: base.path(),
            staged: &[],
            mode: &CompressionMode::Store,
            append: true,
        };

        write_file(&output, "old archive")?;
        write(&request, &archiver)?;
        assert!(output.exists());

        write(
            &WriteRequest {
                append: false,
                ..request
            },
            &archiver,
        )?;
        assert!(!output.exists());

        // INVARIANT: Missing archive is fine when replacing.
        write(
            &WriteRequest {
                append: false,
                ..request
            },
            &archiver,
        )?;
        assert!(archiver.calls.borrow().is_empty());

        Ok(())
    }
}
