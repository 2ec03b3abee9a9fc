use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
};

use crate::error::RegistryError;
use crate::models::task::TaskRecord;

/// Exclusive advisory lock held for a whole read-modify-write cycle.
pub struct RegistryLock {
    file: File,
}

impl RegistryLock {
    pub fn acquire(path: &Path) -> Result<Self, RegistryError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| RegistryError::io(path, e))?;

        loop {
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } == 0 {
                return Ok(Self { file });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RegistryError::io(path, err));
            }
        }
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        with_suffix(&self.path, ".lock")
    }

    pub fn lock(&self) -> Result<RegistryLock, RegistryError> {
        RegistryLock::acquire(&self.lock_path())
    }

    pub fn load(&self) -> Result<Vec<TaskRecord>, RegistryError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegistryError::io(&self.path, e)),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&data).map_err(|source| RegistryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes a sibling temp file and renames it over the registry, so readers
    /// never observe a partially written document.
    pub fn save(&self, tasks: &[TaskRecord]) -> Result<(), RegistryError> {
        let body = serde_json::to_string_pretty(tasks)?;
        let tmp = with_suffix(&self.path, ".tmp");

        let mut file = File::create(&tmp).map_err(|e| RegistryError::io(&tmp, e))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| RegistryError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| RegistryError::io(&self.path, e))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
