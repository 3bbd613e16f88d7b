use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

/// Exclusive advisory lock on a file, released when dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Lock on {path} is held by another process")]
    Contended { path: PathBuf },
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl FileLock {
    pub fn new(path: &Path, wait: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(outcome) if outcome.acquired() => return Ok(Self { _file: file }),
                Ok(_) => {}
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {}
                Err(error) => return Err(error.into()),
            }
            if start.elapsed() >= wait {
                return Err(Error::Contended {
                    path: path.to_path_buf(),
                });
            }
            debug!("Failed to acquire a lock on {}, retrying", path.display());
            std::thread::sleep(Duration::from_millis(500));
        }
    }
}

// fs4 releases disagree on whether contention is `Err(..)` or `Ok(false)`.
trait LockOutcome {
    fn acquired(self) -> bool;
}

impl LockOutcome for () {
    fn acquired(self) -> bool {
        true
    }
}

impl LockOutcome for bool {
    fn acquired(self) -> bool {
        self
    }
}
