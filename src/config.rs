// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of archive descriptors, the TOML files that describe
//! which archives to build and how to drive the archiver while doing so.
//!
//! # General Layout
//!
//! A descriptor is composed of archiver settings, plus any number of archive
//! jobs. Glob based jobs live in `[[archive]]` tables, and mapping based jobs
//! live in `[[mapped]]` tables:
//!
//! ```toml
//! [archiver]
//! binary = "7z"
//! show_progress = false
//!
//! [[archive]]
//! output = "$BUILD/app.7z"
//! base_dir = "."
//! include = ["*"]
//! exclude = ["tools/*"]
//! rename = [["C:/Python/python.exe", "bin/python.exe"]]
//!
//! [[mapped]]
//! output = "$BUILD/installer.7z"
//! copy_mode = true
//! mapping = [["./tools/entrypoint/install.bat", "./install.bat"]]
//! ```
//!
//! Path fields undergo shell expansion when parsed.

use crate::{
    archive::{ArchiveJob, RenamePair},
    archiver::{Lzma2Settings, SevenZip, SuppressList},
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Archive descriptor layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ArchiveDescriptor {
    /// Settings for the external archiver.
    #[serde(default)]
    pub archiver: ArchiverSettings,

    /// Glob based archive jobs.
    #[serde(default, rename = "archive", skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<ArchiveEntry>,

    /// Mapping based archive jobs.
    #[serde(default, rename = "mapped", skip_serializing_if = "Vec::is_empty")]
    pub mapped: Vec<MappedEntry>,
}

impl ArchiveDescriptor {
    /// Read and parse descriptor file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError`] if file contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        data.parse()
    }

    /// Resolve relative paths of every job against `root`.
    ///
    /// Descriptors are usually written with paths relative to themselves, so
    /// callers pass in the directory holding the descriptor.
    pub fn rebase(&mut self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        for entry in &mut self.archives {
            entry.output = root.join(&entry.output);
            entry.base_dir = root.join(&entry.base_dir);
        }

        for entry in &mut self.mapped {
            entry.output = root.join(&entry.output);
            entry.base_dir = root.join(&entry.base_dir);
        }
    }
}

impl FromStr for ArchiveDescriptor {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut descriptor: ArchiveDescriptor =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        descriptor.archiver.binary = expand(&descriptor.archiver.binary)?;
        for entry in &mut descriptor.archives {
            entry.output = expand(&entry.output)?;
            entry.base_dir = expand(&entry.base_dir)?;
            for pair in &mut entry.rename {
                *pair = expand_pair(pair)?;
            }
        }

        for entry in &mut descriptor.mapped {
            entry.output = expand(&entry.output)?;
            entry.base_dir = expand(&entry.base_dir)?;
            for pair in &mut entry.mapping {
                *pair = expand_pair(pair)?;
            }
        }

        Ok(descriptor)
    }
}

impl Display for ArchiveDescriptor {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// External archiver settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiverSettings {
    /// Archiver binary, looked up through PATH if not a path.
    pub binary: PathBuf,

    /// Ask archiver to report progress.
    pub show_progress: bool,

    /// Extra output patterns to suppress on top of the builtin ones.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppress: Vec<String>,

    /// LZMA2 tuning for `.7z` output.
    pub lzma2: Lzma2Settings,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("7z"),
            show_progress: false,
            suppress: Vec::new(),
            lzma2: Lzma2Settings::default(),
        }
    }
}

impl ArchiverSettings {
    /// Construct archiver driver from settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Suppress`] if a suppression pattern is not a
    ///   valid regex.
    pub fn to_archiver(&self) -> Result<SevenZip, ConfigError> {
        let mut suppress = SuppressList::seven_zip();
        suppress.extend(&self.suppress)?;

        Ok(SevenZip::new(&self.binary)
            .with_progress(self.show_progress)
            .with_suppress_list(suppress))
    }
}

/// Glob based archive job.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ArchiveEntry {
    /// Archive to write.
    pub output: PathBuf,

    /// Directory to base patterns on.
    #[serde(default = "current_dir")]
    pub base_dir: PathBuf,

    /// Globs of files to include.
    pub include: Vec<String>,

    /// Globs of files to exclude again.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Rename rules as `[source, destination]` pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rename: Vec<RenamePair>,

    /// Store files without compression.
    #[serde(default)]
    pub copy_mode: bool,

    /// Add to existing archive.
    #[serde(default)]
    pub append: bool,
}

impl From<ArchiveEntry> for ArchiveJob {
    fn from(entry: ArchiveEntry) -> Self {
        ArchiveJob {
            output: entry.output,
            base_dir: entry.base_dir,
            include: entry.include,
            exclude: entry.exclude,
            rename: entry.rename,
            copy_mode: entry.copy_mode,
            append: entry.append,
        }
    }
}

/// Mapping based archive job.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct MappedEntry {
    /// Archive to write.
    pub output: PathBuf,

    /// Directory that mapping sources are relative to.
    #[serde(default = "current_dir")]
    pub base_dir: PathBuf,

    /// Store files without compression.
    #[serde(default)]
    pub copy_mode: bool,

    /// Files to archive as `[source, destination]` pairs.
    pub mapping: Vec<RenamePair>,
}

fn current_dir() -> PathBuf {
    PathBuf::from(".")
}

fn expand(path: &Path) -> Result<PathBuf, ConfigError> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

fn expand_pair(pair: &RenamePair) -> Result<RenamePair, ConfigError> {
    Ok(RenamePair::new(
        expand(&pair.source)?,
        expand(&pair.destination)?,
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read descriptor {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Suppression pattern is not a valid regex.
    #[error(transparent)]
    Suppress(#[from] regex::Error),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
