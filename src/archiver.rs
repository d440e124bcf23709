// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External archiver driver.
//!
//! Archives are never compressed in process. A 7-Zip compatible command line
//! archiver does the actual work, and this module only decides how to call
//! it.
//!
//! # Command Line Contract
//!
//! Files are handed over through a list file, one path per line, encoded as
//! UTF-8, using forward slashes, and relative to the working directory of the
//! archiver process:
//!
//! ```text
//! 7z a -y [-bsp1] <mode switches> <output> @<list file>
//! 7z x -y [-bsp1] -o<destination> <archive>
//! ```
//!
//! Console output of the archiver goes through a [`SuppressList`]. Routine
//! chatter is dropped, anything else is logged and reported back verbatim if
//! the archiver exits with failure.

pub mod compression;
pub mod suppress;

pub use compression::{CompressionMode, Lzma2Settings};
pub use suppress::SuppressList;

use std::{
    ffi::{OsStr, OsString},
    fs::remove_dir_all,
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::mpsc::{self, Sender},
    thread,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Request to add files to an archive.
#[derive(Debug, Clone, Copy)]
pub struct AddRequest<'a> {
    /// Absolute path of archive to create or append to.
    pub output: &'a Path,

    /// Working directory of the archiver process.
    pub working_dir: &'a Path,

    /// Files to add, relative to the working directory.
    pub files: &'a [PathBuf],

    /// Compression to apply.
    pub mode: &'a CompressionMode,

    /// Whether this request adds to an archive left by an earlier request.
    ///
    /// Informational. 7-Zip creates the archive on the first add and updates
    /// it afterwards, so the driver only uses it for logging. Removing an old
    /// archive is up to the caller.
    pub append: bool,
}

/// Layer of indirection for external archivers.
pub trait Archiver {
    /// Add files to archive.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiverError`] if archiver cannot be run or fails.
    fn add(&self, request: &AddRequest<'_>) -> Result<()>;

    /// Extract archive into destination directory.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiverError`] if archiver cannot be run or fails.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

impl<A: Archiver + ?Sized> Archiver for &A {
    fn add(&self, request: &AddRequest<'_>) -> Result<()> {
        (**self).add(request)
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        (**self).extract(archive, destination)
    }
}

/// 7-Zip command line archiver.
#[derive(Debug, Clone)]
pub struct SevenZip {
    binary: PathBuf,
    show_progress: bool,
    suppress: SuppressList,
}

impl Default for SevenZip {
    fn default() -> Self {
        Self::new("7z")
    }
}

impl SevenZip {
    /// Construct new 7-Zip driver for binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            show_progress: false,
            suppress: SuppressList::seven_zip(),
        }
    }

    /// Ask archiver to report progress.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Replace suppression list.
    pub fn with_suppress_list(mut self, suppress: SuppressList) -> Self {
        self.suppress = suppress;
        self
    }

    /// Extract archive, clearing out destination directory first if `force`
    /// is set.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiverError::ClearDestination`] if destination cannot be
    ///   removed.
    /// - Return [`ArchiverError`] if archiver cannot be run or fails.
    pub fn extract_fresh(&self, archive: &Path, destination: &Path, force: bool) -> Result<()> {
        if force && destination.exists() {
            remove_dir_all(destination).map_err(|err| ArchiverError::ClearDestination {
                source: err,
                path: destination.to_path_buf(),
            })?;
        }

        self.extract(archive, destination)
    }

    fn progress_switch(&self) -> Option<&'static str> {
        self.show_progress.then_some("-bsp1")
    }
}

impl Archiver for SevenZip {
    #[instrument(skip(self, request), level = "debug")]
    fn add(&self, request: &AddRequest<'_>) -> Result<()> {
        let list = write_list_file(request.files)?;
        debug!(
            "{} {} files from {:?} to {:?}",
            if request.append { "append" } else { "add" },
            request.files.len(),
            request.working_dir.display(),
            request.output.display()
        );

        let mut list_arg = OsString::from("@");
        list_arg.push(list.path());

        let mut args: Vec<OsString> = vec!["a".into(), "-y".into()];
        args.extend(self.progress_switch().map(OsString::from));
        args.extend(request.mode.switches().into_iter().map(OsString::from));
        args.push(request.output.as_os_str().to_owned());
        args.push(list_arg);

        run_filtered(&self.binary, args, request.working_dir, &self.suppress)?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        info!(
            "extract {:?} to {:?}",
            archive.display(),
            destination.display()
        );

        let mut out_arg = OsString::from("-o");
        out_arg.push(destination.as_os_str());

        let mut args: Vec<OsString> = vec!["x".into(), "-y".into()];
        args.extend(self.progress_switch().map(OsString::from));
        args.push(out_arg);
        args.push(archive.as_os_str().to_owned());

        run_filtered(&self.binary, args, Path::new("."), &self.suppress)?;

        Ok(())
    }
}

fn write_list_file(files: &[PathBuf]) -> Result<NamedTempFile> {
    let mut list = tempfile::Builder::new()
        .prefix("ziplist")
        .suffix(".txt")
        .tempfile()
        .map_err(ArchiverError::ListFile)?;

    let content = files
        .iter()
        .map(crate::path::to_slash)
        .collect::<Vec<_>>()
        .join("\n");

    list.write_all(content.as_bytes())
        .and_then(|()| list.flush())
        .map_err(ArchiverError::ListFile)?;

    Ok(list)
}

/// Run command, dropping suppressed output lines.
///
/// Lines that survive suppression are logged as they arrive, and returned.
/// Standard output and standard error are read side by side, so their lines
/// interleave roughly in the order the command wrote them.
///
/// # Errors
///
/// - Return [`ArchiverError::Spawn`] if command cannot be started.
/// - Return [`ArchiverError::Output`] if output of command cannot be read.
/// - Return [`ArchiverError::Exit`] if command exits with failure. The error
///   carries every unsuppressed line of output.
pub fn run_filtered(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    working_dir: &Path,
    suppress: &SuppressList,
) -> Result<Vec<String>> {
    let cmd = cmd.as_ref();
    let mut child = Command::new(cmd)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| ArchiverError::Spawn {
            source: err,
            command: cmd.to_os_string(),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (sender, receiver) = mpsc::channel();

    // INVARIANT: Drain both pipes at once so neither can fill up and stall
    //   the archiver.
    let (shown, failure) = thread::scope(|scope| {
        let readers = [
            stdout.map(|pipe| {
                let sender = sender.clone();
                scope.spawn(move || pump_lines(pipe, &sender))
            }),
            stderr.map(|pipe| {
                let sender = sender.clone();
                scope.spawn(move || pump_lines(pipe, &sender))
            }),
        ];
        drop(sender);

        let mut shown = Vec::new();
        let mut failure = None;
        for chunk in receiver {
            match chunk {
                Ok(chunk) => {
                    for line in suppress.filter(&chunk) {
                        info!("{line}");
                        shown.push(line);
                    }
                }
                Err(err) if failure.is_none() => {
                    // INVARIANT: Stop archiver once a pipe goes unread, so the
                    //   other pipe closes instead of blocking forever.
                    if let Err(kill) = child.kill() {
                        debug!("failed to stop archiver {cmd:?}: {kill}");
                    }
                    failure = Some(err);
                }
                Err(_) => {}
            }
        }

        for reader in readers.into_iter().flatten() {
            if reader.join().is_err() {
                failure.get_or_insert(io::Error::other("archiver output reader panicked"));
            }
        }

        (shown, failure)
    });

    if let Some(err) = failure {
        if let Err(wait) = child.wait() {
            debug!("failed to reap archiver {cmd:?}: {wait}");
        }

        return Err(ArchiverError::Output {
            source: err,
            command: cmd.to_os_string(),
        });
    }

    let status = child.wait().map_err(|err| ArchiverError::Spawn {
        source: err,
        command: cmd.to_os_string(),
    })?;

    if !status.success() {
        return Err(ArchiverError::Exit {
            command: cmd.to_os_string(),
            status,
            output: shown.join("\n"),
        });
    }

    Ok(shown)
}

/// Forward output of pipe line by line until it closes or fails.
fn pump_lines(pipe: impl Read, sender: &Sender<io::Result<String>>) {
    let mut reader = BufReader::new(pipe);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let chunk = match reader.read_until(b'\n', &mut raw) {
            Ok(0) => break,
            Ok(_) => Ok(String::from_utf8_lossy(&raw).into_owned()),
            Err(err) => Err(err),
        };

        let failed = chunk.is_err();
        if sender.send(chunk).is_err() || failed {
            break;
        }
    }
}

/// Archiver error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// Archiver process cannot be started or waited on.
    #[error("failed to run archiver {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: OsString,
    },

    /// Output of archiver cannot be read.
    #[error("failed to read output of archiver {command:?}")]
    Output {
        #[source]
        source: std::io::Error,
        command: OsString,
    },

    /// Archiver exited with failure.
    #[error("archiver {command:?} failed with {status}:\n{output}")]
    Exit {
        command: OsString,
        status: ExitStatus,
        output: String,
    },

    /// List file for archiver cannot be written.
    #[error("failed to write archiver list file")]
    ListFile(#[source] std::io::Error),

    /// Extraction destination cannot be cleared.
    #[error("failed to clear extraction destination {:?}", path.display())]
    ClearDestination {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArchiverError> = std::result::Result<T, E>;
