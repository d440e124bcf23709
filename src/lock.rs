// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exclusive lock probing.
//!
//! Other processes may hold files of the application tree open while an
//! archive is being built, e.g., a running copy of the installed application,
//! an editor, or an anti-virus scanner. On Windows the archiver cannot read a
//! file that another process opened without sharing, and the whole build
//! fails. Files that are locked this way get copied into the staging tree
//! first, and are archived from there instead.
//!
//! How locks behave depends on the host platform, so probing is modeled as a
//! capability through [`LockDetector`].

use std::path::Path;
use tracing::debug;

/// Determine whether a file is currently locked by someone else.
pub trait LockDetector {
    /// Check if file at `path` is locked.
    ///
    /// Failures that are not caused by a lock report `false`, so that the
    /// archiver gets to report the actual problem.
    fn is_locked(&self, path: &Path) -> bool;
}

/// Lock detector for the host platform.
///
/// On Windows, the detector opens the file for reading and writing without
/// sharing. A sharing or lock violation means another process holds it.
///
/// Elsewhere, the detector tries to take a non-blocking advisory exclusive
/// lock.
/// Failing to get it means another holder exists. The lock is released right
/// away.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformLockDetector;

impl PlatformLockDetector {
    /// Construct new platform lock detector.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl LockDetector for PlatformLockDetector {
    fn is_locked(&self, path: &Path) -> bool {
        use std::{fs::OpenOptions, os::windows::fs::OpenOptionsExt};

        const ERROR_SHARING_VIOLATION: i32 = 32;
        const ERROR_LOCK_VIOLATION: i32 = 33;

        match OpenOptions::new()
            .read(true)
            .write(true)
            .share_mode(0)
            .open(path)
        {
            Ok(_) => false,
            Err(err) => {
                let locked = matches!(
                    err.raw_os_error(),
                    Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
                );
                debug!("lock check {:?}: {err}", path.display());
                locked
            }
        }
    }
}

#[cfg(not(windows))]
impl LockDetector for PlatformLockDetector {
    fn is_locked(&self, path: &Path) -> bool {
        use fs2::FileExt;
        use std::{fs::File, io::ErrorKind};

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                debug!("lock check {:?}: {err}", path.display());
                return false;
            }
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(err) => err.kind() == ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error(),
        }
    }
}

/// Lock detector that never reports a lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockDetector;

impl LockDetector for NoLockDetector {
    fn is_locked(&self, _path: &Path) -> bool {
        false
    }
}

impl<P: LockDetector + ?Sized> LockDetector for &P {
    fn is_locked(&self, path: &Path) -> bool {
        (**self).is_locked(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::TempDir;

    #[test]
    fn no_lock_detector_never_reports_lock() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let path = root.path().join("free.txt");
        write(&path, "free")?;

        assert!(!NoLockDetector.is_locked(&path));
        assert!(!NoLockDetector.is_locked(&root.path().join("missing.txt")));

        Ok(())
    }

    #[test]
    fn platform_detector_reports_unlocked_file() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let path = root.path().join("free.txt");
        write(&path, "free")?;

        assert!(!PlatformLockDetector::new().is_locked(&path));
        assert!(!PlatformLockDetector::new().is_locked(&root.path().join("missing.txt")));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn platform_detector_reports_held_lock() -> anyhow::Result<()> {
        use fs2::FileExt;
        use std::fs::File;

        let root = TempDir::new()?;
        let path = root.path().join("held.txt");
        write(&path, "held")?;

        let holder = File::open(&path)?;
        holder.try_lock_exclusive()?;
        assert!(PlatformLockDetector::new().is_locked(&path));

        FileExt::unlock(&holder)?;
        assert!(!PlatformLockDetector::new().is_locked(&path));

        Ok(())
    }
}
