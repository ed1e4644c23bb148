//! Exclusive environment-root lock, adapted verbatim in spirit from the
//! teacher's `core::project::lock::ProjectLock`
//! (`px-core/src/core/project/lock.rs`): one runner instance owns the
//! environment directory at a time (spec §5: "failure to acquire aborts
//! immediately"). `try_acquire` returning `None` is Testable Property 7 / S6
//! (concurrent invocation fails immediately, no mutation).

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs4::FileExt;

#[derive(Debug)]
pub struct EnvironmentLock {
    _file: File,
}

impl EnvironmentLock {
    /// Attempts to acquire the exclusive lock at `<env_root>/.dht/env.lock`,
    /// returning `Ok(None)` (not an error) if another runner already holds
    /// it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created or
    /// opened.
    pub fn try_acquire(env_root: &Path) -> Result<Option<Self>> {
        let path = lock_path(env_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            #[cfg(windows)]
            Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn lock_path(env_root: &Path) -> PathBuf {
    env_root.join(".dht").join("env.lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let tmp = tempfile::tempdir().unwrap();
        let first = EnvironmentLock::try_acquire(tmp.path()).unwrap();
        assert!(first.is_some());
        let second = EnvironmentLock::try_acquire(tmp.path()).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn lock_is_released_when_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let first = EnvironmentLock::try_acquire(tmp.path()).unwrap();
            assert!(first.is_some());
        }
        let second = EnvironmentLock::try_acquire(tmp.path()).unwrap();
        assert!(second.is_some());
    }
}
