//! Key/value persistence for the two JSON blobs that outlive a session:
//! the lane order ([`LANES_KEY`]) and the app settings ([`SETTINGS_KEY`]).
//!
//! Each blob is read once at startup and rewritten in full on every change.
//! Absent or malformed blobs fall back to defaults at the call site.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Key for the ordered list of open topics.
pub const LANES_KEY: &str = "subreddits";
/// Key for the persisted [`AppSettings`](crate::settings::AppSettings).
pub const SETTINGS_KEY: &str = "appSettings";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode blob: {0}")]
    Encode(#[from] serde_json::Error),

    /// Keys map to file names, so only `[A-Za-z0-9_-]` is accepted.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Durable string blobs addressed by key.
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob under `key`. Returns once the write is durable.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

// ============================================================================
// File Store
// ============================================================================

/// One `<key>.json` file per blob inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl BlobStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        atomic_write(&path, value.as_bytes())
    }
}

/// Write-to-temp-then-rename so a crash never leaves a half-written blob.
fn atomic_write(dst: &Path, content: &[u8]) -> Result<(), StorageError> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        // On Windows, rename fails if destination exists
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }

        std::fs::rename(&temp_path, dst)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StorageError::Io(e));
    }
    Ok(())
}

// ============================================================================
// Memory Store
// ============================================================================

/// Process-local store. Nothing survives the process; used by tests and
/// one-shot commands that must not touch the user's data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// JSON Helpers
// ============================================================================

/// Load and decode a blob. Absent, unreadable or malformed blobs yield `None`
/// so the caller can fall back to defaults.
pub fn load_json<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Option<T> {
    let raw = match store.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::debug!(key, "No persisted blob, using defaults");
            return None;
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read persisted blob, using defaults");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Malformed persisted blob, using defaults");
            None
        }
    }
}

/// Encode and write a blob in full.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn BlobStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let encoded = serde_json::to_string(value)?;
    store.write(key, &encoded)
}
