// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive assembly.
//!
//! Turn a description of what should go into an archive into the archive
//! itself. Assembly happens as a pipeline of four stages:
//!
//! 1. [`resolve`] expands ordered include and exclude glob lists into a
//!    [`FileSet`].
//! 2. [`plan`] applies rename rules to the file set, and partitions it into
//!    direct files and copy instructions.
//! 3. [`stage`] carries out copy instructions inside a fresh staging
//!    directory, and moves locked direct files there as well.
//! 4. [`write`] hands direct files and staged files to the archiver, one pass
//!    each.
//!
//! The first two stages are pure. Nothing touches the file system until the
//! plan is known to be valid, so configuration mistakes never leave a half
//! written archive behind.
//!
//! # Archive Layout
//!
//! The final archive contains every direct file at its path relative to the
//! base directory, plus every staged file at its rename destination. No path
//! appears under both.
//!
//! # Concurrency
//!
//! Assembly is single threaded and blocking. Each build owns its staging
//! directory. The output path is assumed to be owned by the caller, so two
//! builds must never target the same output at the same time.

pub mod fileset;
pub mod plan;
pub mod resolve;
pub mod stage;
pub mod write;

pub use fileset::FileSet;
pub use plan::{CopyInstruction, RenamePair, RenameSource, StagingPlan};
pub use stage::StagedFiles;

use crate::{
    archiver::{Archiver, CompressionMode, Lzma2Settings, SevenZip},
    lock::{LockDetector, PlatformLockDetector},
    path::{PathError, PathKey},
};

use glob::Pattern;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// One archive to build.
///
/// These fields are the whole contract between the packaging tool and the
/// archive engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveJob {
    /// Archive to write.
    pub output: PathBuf,

    /// Directory that relative patterns and archive paths are based on.
    pub base_dir: PathBuf,

    /// Globs of files to include.
    pub include: Vec<String>,

    /// Globs of files to exclude again.
    pub exclude: Vec<String>,

    /// Rename rules, applied in order.
    pub rename: Vec<RenamePair>,

    /// Store files without compression.
    pub copy_mode: bool,

    /// Add to an existing archive instead of replacing it.
    pub append: bool,
}

impl ArchiveJob {
    /// Construct new job that archives everything matched by `include`.
    pub fn new(
        output: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
        include: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            output: output.into(),
            base_dir: base_dir.into(),
            include: include.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn exclude(mut self, exclude: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn rename(mut self, rename: impl IntoIterator<Item = RenamePair>) -> Self {
        self.rename = rename.into_iter().collect();
        self
    }

    pub fn copy_mode(mut self, copy_mode: bool) -> Self {
        self.copy_mode = copy_mode;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Absolute path of written archive.
    pub output: PathBuf,

    /// Number of files archived from the base directory.
    pub direct: usize,

    /// Number of files archived from the staging directory.
    pub staged: usize,
}

/// Archive builder.
///
/// Drives an [`Archiver`] through the assembly pipeline, probing direct files
/// for locks with a [`LockDetector`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder<A = SevenZip, P = PlatformLockDetector>
where
    A: Archiver,
    P: LockDetector,
{
    archiver: A,
    detector: P,
    lzma2: Lzma2Settings,
}

impl<A> ArchiveBuilder<A, PlatformLockDetector>
where
    A: Archiver,
{
    /// Construct new archive builder for archiver.
    pub fn new(archiver: A) -> Self {
        Self {
            archiver,
            detector: PlatformLockDetector::new(),
            lzma2: Lzma2Settings::default(),
        }
    }
}

impl<A, P> ArchiveBuilder<A, P>
where
    A: Archiver,
    P: LockDetector,
{
    /// Use a different lock detector.
    pub fn with_lock_detector<Q: LockDetector>(self, detector: Q) -> ArchiveBuilder<A, Q> {
        ArchiveBuilder {
            archiver: self.archiver,
            detector,
            lzma2: self.lzma2,
        }
    }

    /// Use different LZMA2 settings for compressed archives.
    pub fn with_lzma2(mut self, lzma2: Lzma2Settings) -> Self {
        self.lzma2 = lzma2;
        self
    }

    /// Archiver in use.
    pub fn archiver(&self) -> &A {
        &self.archiver
    }

    /// Build archive described by job.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Path`] if the base directory is missing.
    /// - Return [`ArchiveError::Resolve`] if a glob pattern is bad.
    /// - Return [`ArchiveError::Plan`] if rename rules are invalid, or do not
    ///   cover every absolute file.
    /// - Return [`ArchiveError::StageDir`] or [`ArchiveError::Stage`] if the
    ///   staging tree cannot be built.
    /// - Return [`ArchiveError::Write`] if the archiver fails.
    #[instrument(skip(self, job), level = "debug")]
    pub fn build(&self, job: &ArchiveJob) -> Result<BuildReport> {
        let base_dir = PathKey::try_new_dir(&job.base_dir)?;
        let output = absolute_output(&job.output)?;

        let mut files = resolve::resolve_include_exclude(
            &base_dir,
            job.include.iter().cloned(),
            job.exclude.iter().cloned(),
        )?;

        // INVARIANT: An archive never contains itself, even when the globs
        //   reach it. The old copy may be gone before the archiver runs.
        if files.remove(&PathKey::new(&output, base_dir.as_path())).is_some() {
            debug!("leaving {:?} out of its own file list", output.display());
        }

        let plan = plan::plan(&base_dir, &files, &job.rename)?;

        let stage_dir = tempfile::Builder::new()
            .prefix("zipstage")
            .tempdir()
            .map_err(ArchiveError::StageDir)?;
        let staged = stage::materialize(plan, &base_dir, stage_dir.path(), &self.detector)?;

        let direct = staged.direct_paths(&base_dir);
        let mode = CompressionMode::select(job.copy_mode, &self.lzma2);
        write::write(
            &write::WriteRequest {
                output: &output,
                base_dir: base_dir.as_path(),
                direct: &direct,
                stage_dir: stage_dir.path(),
                staged: &staged.staged,
                mode: &mode,
                append: job.append,
            },
            &self.archiver,
        )?;

        close_stage_dir(stage_dir);

        info!(
            "built {:?} with {} direct and {} staged files",
            output.display(),
            direct.len(),
            staged.staged.len()
        );

        Ok(BuildReport {
            output,
            direct: direct.len(),
            staged: staged.staged.len(),
        })
    }

    /// Build archive from a list of source to destination mappings.
    ///
    /// Mappings whose source and destination name the same file are archived
    /// directly. Every other mapping becomes a rename rule. The output is
    /// always replaced.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError`] for the same reasons as [`Self::build`].
    pub fn build_mapped(
        &self,
        output: impl Into<PathBuf>,
        base_dir: impl AsRef<Path>,
        mapping: &[RenamePair],
        copy_mode: bool,
    ) -> Result<BuildReport> {
        let job = mapped_job(output.into(), base_dir.as_ref(), mapping, copy_mode)?;
        self.build(&job)
    }

    /// Extract archive into destination directory.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Archiver`] if the archiver fails.
    pub fn extract(&self, archive: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
        Ok(self
            .archiver
            .extract(archive.as_ref(), destination.as_ref())?)
    }
}

/// Translate mapping list into an archive job.
fn mapped_job(
    output: PathBuf,
    base_dir: &Path,
    mapping: &[RenamePair],
    copy_mode: bool,
) -> Result<ArchiveJob> {
    let base_key = PathKey::try_new_dir(base_dir)?;
    let mut include = Vec::with_capacity(mapping.len());
    let mut rename = Vec::new();

    for pair in mapping {
        let source = PathKey::new(&pair.source, base_key.as_path());
        let destination = PathKey::new(&pair.destination, base_key.as_path());
        include.push(Pattern::escape(pair.source.to_string_lossy().as_ref()));

        if source != destination {
            rename.push(pair.clone());
        }
    }

    Ok(ArchiveJob {
        output,
        base_dir: base_dir.to_path_buf(),
        include,
        exclude: Vec::new(),
        rename,
        copy_mode,
        append: false,
    })
}

fn absolute_output(output: &Path) -> Result<PathBuf> {
    std::path::absolute(output).map_err(|err| ArchiveError::Output {
        source: err,
        path: output.to_path_buf(),
    })
}

fn close_stage_dir(stage_dir: TempDir) {
    let path = stage_dir.path().to_path_buf();
    if let Err(err) = stage_dir.close() {
        warn!("failed to remove staging directory {:?}: {err}", path.display());
    }
}

/// All possible error types for archive assembly.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Base directory cannot be resolved.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Output path cannot be made absolute.
    #[error("cannot resolve archive output path {:?}", path.display())]
    Output {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Glob lists cannot be resolved.
    #[error(transparent)]
    Resolve(#[from] resolve::ResolveError),

    /// Rename rules cannot be applied.
    #[error(transparent)]
    Plan(#[from] plan::PlanError),

    /// Staging directory cannot be created.
    #[error("failed to create staging directory")]
    StageDir(#[source] std::io::Error),

    /// Staging tree cannot be materialized.
    #[error(transparent)]
    Stage(#[from] stage::StageError),

    /// Archive cannot be written.
    #[error(transparent)]
    Write(#[from] write::WriteError),

    /// Archiver failed outside of a build.
    #[error(transparent)]
    Archiver(#[from] crate::archiver::ArchiverError),
}

impl ArchiveError {
    /// Check if error stems from invalid configuration, i.e., an absolute
    /// rename destination or an absolute file without a rename rule.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Plan(error) if error.is_configuration())
    }
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archive::write::tests::RecordingArchiver, lock::NoLockDetector};
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write as write_file};

    fn tree(files: &[&str]) -> anyhow::Result<TempDir> {
        let root = TempDir::new()?;
        for file in files {
            let path = root.path().join(file);
            create_dir_all(path.parent().unwrap())?;
            write_file(path, file.as_bytes())?;
        }
        Ok(root)
    }

    struct LockedBy(&'static str);

    impl LockDetector for LockedBy {
        fn is_locked(&self, path: &Path) -> bool {
            path.ends_with(self.0)
        }
    }

    #[test]
    fn build_archives_direct_then_staged_files() -> anyhow::Result<()> {
        let root = tree(&["1/i/a.txt", "1/ii.txt", "2/i/d.txt", "2/ii/e.txt"])?;
        let output = root.path().join("out").join("app.7z");
        let builder =
            ArchiveBuilder::new(RecordingArchiver::default()).with_lock_detector(NoLockDetector);

        let job = ArchiveJob::new(&output, root.path(), ["1", "2"])
            .exclude(["2/ii/e.txt"])
            .rename([RenamePair::new("2", "3")]);
        let report = builder.build(&job)?;

        assert_eq!(report.direct, 2);
        assert_eq!(report.staged, 1);

        let calls = builder.archiver().calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].files,
            vec![PathBuf::from("1/i/a.txt"), PathBuf::from("1/ii.txt")]
        );
        assert_eq!(calls[1].files, vec![PathBuf::from("3/i/d.txt")]);
        assert!(!calls[0].append);
        assert!(calls[1].append);
        assert_eq!(calls[0].output, calls[1].output);

        // INVARIANT: Staging tree exists while the archiver runs.
        assert!(calls.iter().all(|call| call.existing.iter().all(|exists| *exists)));

        Ok(())
    }

    #[test]
    fn build_leaves_output_out_of_its_own_file_list() -> anyhow::Result<()> {
        let root = tree(&["a.txt"])?;
        let output = root.path().join("app.7z");
        write_file(&output, "previous build")?;
        let builder =
            ArchiveBuilder::new(RecordingArchiver::default()).with_lock_detector(NoLockDetector);

        let report = builder.build(&ArchiveJob::new(&output, root.path(), ["*"]))?;
        assert_eq!(report.direct, 1);

        write_file(&output, "first build")?;
        builder.build(&ArchiveJob::new(&output, root.path(), ["*"]).append(true))?;
        assert!(output.exists());

        let calls = builder.archiver().calls.borrow();
        assert_eq!(calls.len(), 2);
        for call in calls.iter() {
            assert_eq!(call.files, vec![PathBuf::from("a.txt")]);
            assert_eq!(call.existing, vec![true]);
        }

        Ok(())
    }

    #[test]
    fn build_rejects_unrenamed_absolute_path_before_archiving() -> anyhow::Result<()> {
        let root = tree(&["a.txt"])?;
        let runtime = tree(&["python.exe"])?;
        let interpreter = runtime.path().join("python.exe");
        let output = root.path().join("app.7z");
        write_file(&output, "previous build")?;
        let builder = ArchiveBuilder::new(RecordingArchiver::default());

        let job = ArchiveJob::new(
            &output,
            root.path(),
            ["a.txt".to_string(), interpreter.to_string_lossy().into_owned()],
        );
        let result = builder.build(&job);

        match result {
            Err(error) => assert!(error.is_configuration(), "unexpected error {error:?}"),
            Ok(report) => panic!("expected configuration error, got {report:?}"),
        }
        assert!(builder.archiver().calls.borrow().is_empty());
        assert_eq!(read_to_string(&output)?, "previous build");

        Ok(())
    }

    #[test]
    fn build_archives_locked_files_from_stage() -> anyhow::Result<()> {
        let root = tree(&["bin/app.exe", "bin/app.dll"])?;
        let output = root.path().join("app.7z");
        let builder = ArchiveBuilder::new(RecordingArchiver::default())
            .with_lock_detector(LockedBy("app.exe"));

        let report = builder.build(&ArchiveJob::new(&output, root.path(), ["bin"]))?;

        assert_eq!(report.direct, 1);
        assert_eq!(report.staged, 1);

        let calls = builder.archiver().calls.borrow();
        assert_eq!(calls[0].files, vec![PathBuf::from("bin/app.dll")]);
        assert_eq!(calls[1].files, vec![PathBuf::from("bin/app.exe")]);
        assert!(calls[1].existing[0]);

        Ok(())
    }

    #[test]
    fn build_mapped_splits_identity_and_renamed_entries() -> anyhow::Result<()> {
        let root = tree(&["bin/7z.exe", "tools/entrypoint/install.bat"])?;
        let output = root.path().join("installer.7z");
        let builder =
            ArchiveBuilder::new(RecordingArchiver::default()).with_lock_detector(NoLockDetector);

        let mapping = [
            RenamePair::new("./tools/entrypoint/install.bat", "./install.bat"),
            RenamePair::new("./bin/7z.exe", "./bin/7z.exe"),
        ];
        let report = builder.build_mapped(&output, root.path(), &mapping, true)?;

        assert_eq!(report.direct, 1);
        assert_eq!(report.staged, 1);

        let calls = builder.archiver().calls.borrow();
        assert_eq!(calls[0].files, vec![PathBuf::from("bin/7z.exe")]);
        assert_eq!(calls[1].files, vec![PathBuf::from("install.bat")]);

        Ok(())
    }

    #[test]
    fn build_fails_for_missing_base_dir() {
        let builder = ArchiveBuilder::new(RecordingArchiver::default());
        let job = ArchiveJob::new("app.7z", "/this/base/does/not/exist", ["*"]);

        assert!(matches!(builder.build(&job), Err(ArchiveError::Path(_))));
    }
}
