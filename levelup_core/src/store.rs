//! Local key-value persistence with file locking.
//!
//! The device keeps one JSON document per key. Reads take a shared lock,
//! writes go through a locked temp file that is renamed over the original,
//! so a crash mid-write never leaves a half-written document behind.

use crate::snapshot::{self, AppSnapshot};
use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Key under which the application snapshot is persisted
pub const APP_STATE_KEY: &str = "levelup.appState";

/// Key holding the last local snapshot that could not be parsed
pub const APP_STATE_BACKUP_KEY: &str = "levelup.appState.corrupt";

/// Synchronous string key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    fn set_raw(&self, key: &str, value: &str) -> Result<()>;

    /// Typed read. A value that no longer parses is treated as absent.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Stored value for {} is unreadable: {}. Ignoring it.", key, e);
                Ok(None)
            }
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        let contents = serde_json::to_string(value)?;
        self.set_raw(key, &contents)
    }
}

/// One `<key>.json` file per key under a data directory
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::State(format!("invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            tracing::debug!("No stored value at {:?}", path);
            return Ok(None);
        }

        let file = File::open(&path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        Ok(Some(contents))
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Temp file in the same directory so the rename stays atomic
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

        tracing::debug!("Saved {} to {:?}", key, path);
        Ok(())
    }
}

/// In-process store, handy for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::State("memory store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::State("memory store lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The device's copy of the application snapshot
#[derive(Debug)]
pub struct LocalState<S> {
    store: S,
}

impl<S: KeyValueStore> LocalState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current snapshot, creating and persisting a new-user document when
    /// nothing is stored yet
    ///
    /// An unreadable document is copied to [`APP_STATE_BACKUP_KEY`] and left
    /// in place; a new-user document is returned without being saved.
    pub fn load(&self) -> Result<AppSnapshot> {
        let Some(raw) = self.store.get_raw(APP_STATE_KEY)? else {
            tracing::info!("No local state found, starting a new account");
            let snapshot = AppSnapshot::new_user(snapshot::now_millis());
            self.store.set(APP_STATE_KEY, &snapshot)?;
            return Ok(snapshot);
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(
                    "Local state is unreadable: {}. Backed up to {}, using defaults.",
                    e,
                    APP_STATE_BACKUP_KEY
                );
                self.store.set_raw(APP_STATE_BACKUP_KEY, &raw)?;
                Ok(AppSnapshot::new_user(snapshot::now_millis()))
            }
        }
    }

    /// Load, modify and save back, stamping `updated_at`
    pub fn update<F>(&self, f: F) -> Result<AppSnapshot>
    where
        F: FnOnce(&mut AppSnapshot) -> Result<()>,
    {
        let mut snapshot = self.load()?;
        f(&mut snapshot)?;
        snapshot.updated_at = snapshot::now_millis();
        self.store.set(APP_STATE_KEY, &snapshot)?;
        Ok(snapshot)
    }

    /// Store a snapshot exactly as given, timestamp included
    pub fn replace(&self, snapshot: &AppSnapshot) -> Result<()> {
        self.store.set(APP_STATE_KEY, snapshot)
    }

    pub fn export(&self) -> Result<String> {
        snapshot::export_snapshot(&self.load()?)
    }

    /// Validate an exported document and make it the local state
    ///
    /// Rejected payloads leave the stored snapshot untouched.
    pub fn import(&self, text: &str) -> Result<AppSnapshot> {
        let imported = snapshot::import_snapshot(text, snapshot::now_millis())?;
        self.replace(&imported)?;
        tracing::info!(
            "Imported snapshot with {} progression entries",
            imported.progression_by_exercise_id.len()
        );
        Ok(imported)
    }
}
