//! File system layout for sqlvault storage.

use crate::{Config, CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Extension of per-tenant database files.
const DATABASE_EXTENSION: &str = "db";
/// Name of the sealed key file inside the key directory.
const KEY_FILE_NAME: &str = "key";

/// Manages file system paths for databases and key material.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding `<name>.db` files.
    storage_dir: PathBuf,
    /// Directory holding the sealed key file.
    key_dir: PathBuf,
}

impl Paths {
    /// Paths as described by the `storage` section of a configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage_dir: config.storage.path.clone(),
            key_dir: config.storage.encryption.path.clone(),
        }
    }

    /// Create a new Paths instance rooted at a single directory (used by tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            key_dir: base_dir.join("keys"),
            storage_dir: base_dir,
        }
    }

    /// Default config file location (`~/.sqlvault/config.json`).
    pub fn default_config_file() -> CoreResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(home.join(".sqlvault").join("config.json"))
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// `<storage>/<name>.db`
    pub fn database_file(&self, name: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}.{}", name, DATABASE_EXTENSION))
    }

    /// WAL and shared-memory files SQLite keeps next to a database.
    pub fn database_side_files(&self, name: &str) -> [PathBuf; 2] {
        let db = self.database_file(name);
        let mut wal = db.clone().into_os_string();
        wal.push("-wal");
        let mut shm = db.into_os_string();
        shm.push("-shm");
        [PathBuf::from(wal), PathBuf::from(shm)]
    }

    /// `<key dir>/key`
    pub fn key_file(&self) -> PathBuf {
        self.key_dir.join(KEY_FILE_NAME)
    }

    /// Ensure the storage directory exists.
    pub fn ensure_storage_dir(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.storage_dir)?;
        Ok(())
    }

    /// Database files currently present in storage.
    pub fn existing_database_files(&self) -> CoreResult<Vec<PathBuf>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.storage_dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(DATABASE_EXTENSION)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
