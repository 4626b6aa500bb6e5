//! Durable key/value storage.
//!
//! Saved routes and the tile cache each keep one JSON document under a
//! namespaced key, so all a backend has to offer is whole-value get and set.

use crate::Error;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A string key/value area that survives restarts.
pub trait Storage {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` under `key`, replacing what was there
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;

    /// Forget `key`; missing keys are not an error
    fn remove(&mut self, key: &str) -> Result<(), Error>;
}

/// Storage held in memory, with an optional size limit.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an empty, unlimited storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes that would take the total stored bytes over `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        MemoryStorage {
            values: HashMap::new(),
            quota: Some(bytes),
        }
    }

    fn used_without(&self, key: &str) -> usize {
        self.values
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        if let Some(quota) = self.quota {
            let needed = self.used_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(Error::Storage(format!(
                    "quota exceeded: {} of {} bytes",
                    needed, quota
                )));
            }
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.values.remove(key);
        Ok(())
    }
}

/// Storage keeping one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store files in `dir`, creating it if needed
    pub fn new(dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        Ok(FileStorage {
            dir: dir.to_path_buf(),
        })
    }

    #[cfg(feature = "local")]
    /// Store files in the user's XDG data directory
    pub fn home() -> Result<Self, Error> {
        let data_dir = xdg::BaseDirectories::new()
            .get_data_home()
            .ok_or_else(|| Error::Storage("no XDG data home directory".to_string()))?
            .join("route-planner");

        Self::new(&data_dir)
    }

    /// The directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        // Write next to the target and rename, so readers never see half a file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

fn io_error(path: &Path, e: io::Error) -> Error {
    Error::Storage(format!("{}: {}", path.display(), e))
}
