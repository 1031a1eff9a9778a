//! Durable key-value stores.
//!
//! The engine persists its whole collection as one text blob under a single
//! key. `FileStore` keeps each key in its own file with file locking;
//! `MemoryStore` backs tests.

use crate::{Error, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A durable string-keyed store of text blobs
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Directory-backed store: each key lives in `<dir>/<key>.json`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

}

impl KeyValueStore for FileStore {
    /// Read a key's blob under a shared lock
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            tracing::debug!("No blob stored at {:?}", path);
            return Ok(None);
        }

        let file = File::open(&path)?;
        file.lock_shared()?;

        let mut bytes = Vec::new();
        let read = std::io::BufReader::new(&file).read_to_end(&mut bytes);
        file.unlock()?;
        read?;

        tracing::debug!("Read {} bytes from {:?}", bytes.len(), path);
        let contents = String::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("{:?} is not valid UTF-8: {}", path, e)))?;
        Ok(Some(contents))
    }

    /// Atomically replace a key's blob
    ///
    /// Writes to a locked temp file in the same directory, syncs it, then
    /// renames it over the old file. A failure at any step leaves the old
    /// blob in place.
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        let temp = NamedTempFile::new_in(&self.dir)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(value.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Stored {} bytes at {:?}", value.len(), path);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes fail, as a full or disabled store would
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::Persistence("store is read-only".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.entries.remove(key);
        Ok(())
    }
}
