// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive assembly for application packaging.
//!
//! Build `.7z` and `.zip` archives of an application tree through an external
//! 7-Zip compatible archiver. Files are selected with ordered include and
//! exclude glob lists, and can be given a new location inside the archive
//! through rename rules.
//!
//! # Renamed Files
//!
//! The archiver only knows how to store a file at its path relative to the
//! working directory it runs in. Renamed files are therefore copied into a
//! private staging directory under their new name, and archived from there in
//! a second pass. Files outside of the base directory, like an interpreter
//! picked up from the build machine, can only enter an archive this way, so
//! every such file needs a rename rule.
//!
//! # See Also
//!
//! 1. [7-Zip command line reference](https://7-zip.opensource.jp/chm/cmdline/index.htm)

pub mod archive;
pub mod archiver;
pub mod config;
pub mod lock;
pub mod path;

pub use archive::{ArchiveBuilder, ArchiveError, ArchiveJob, BuildReport, RenamePair};
pub use archiver::{Archiver, SevenZip};
