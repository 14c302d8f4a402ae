//! The persisted session slot.
//!
//! A slot holds at most one serialized [`Session`](super::Session). Every
//! write or clear bumps a version on a `watch` channel so other managers
//! sharing the slot know to re-read it.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

use crate::error::{PlanGateError, Result};

/// Key the session is stored under.
pub const SESSION_STORAGE_KEY: &str = "plangate.session";

/// A single persisted value plus change notifications.
#[async_trait]
pub trait SessionStorage: Send + Sync + Debug {
    async fn read(&self) -> Result<Option<String>>;

    async fn write(&self, value: &str) -> Result<()>;

    /// Remove the stored value. Clearing an empty slot is not an error.
    async fn clear(&self) -> Result<()>;

    /// Receiver whose value changes after every write or clear.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

#[derive(Debug, Clone)]
struct ChangeNotifier(Arc<watch::Sender<u64>>);

impl ChangeNotifier {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(Arc::new(tx))
    }

    fn notify(&self) {
        self.0.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.0.subscribe()
    }
}

/// In-process slot. Clones share the value.
#[derive(Debug, Clone)]
pub struct InMemorySessionStorage {
    value: Arc<RwLock<Option<String>>>,
    changes: ChangeNotifier,
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            value: Arc::new(RwLock::new(None)),
            changes: ChangeNotifier::new(),
        }
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.value.read().await.clone())
    }

    async fn write(&self, value: &str) -> Result<()> {
        *self.value.write().await = Some(value.to_string());
        self.changes.notify();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let previous = self.value.write().await.take();
        if previous.is_some() {
            self.changes.notify();
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// Slot backed by a JSON file.
///
/// Writes go to a temporary file that is then renamed over the slot, so a
/// reader never sees half a session. Notifications only cover writes made
/// through this value or its clones.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
    changes: ChangeNotifier,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            changes: ChangeNotifier::new(),
        }
    }

    /// `<dir>/plangate.session.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", SESSION_STORAGE_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn io_error(op: &str, path: &Path, err: std::io::Error) -> PlanGateError {
    PlanGateError::internal(format!(
        "Session storage {} failed for {}: {}",
        op,
        path.display(),
        err
    ))
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &self.path, e)),
        }
    }

    async fn write(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, value)
            .await
            .map_err(|e| io_error("write", &temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error("rename", &self.path, e))?;

        self.changes.notify();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                self.changes.notify();
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &self.path, e)),
        }
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_read_write_clear() {
        let storage = InMemorySessionStorage::new();
        assert_eq!(storage.read().await.unwrap(), None);

        storage.write("{\"a\":1}").await.unwrap();
        assert_eq!(storage.read().await.unwrap().as_deref(), Some("{\"a\":1}"));

        storage.clear().await.unwrap();
        assert_eq!(storage.read().await.unwrap(), None);
        storage.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_clones_share_and_notify() {
        let storage = InMemorySessionStorage::new();
        let other = storage.clone();
        let mut rx = other.subscribe();

        storage.write("x").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(other.read().await.unwrap().as_deref(), Some("x"));

        storage.clear().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(other.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clearing_empty_slot_does_not_notify() {
        let storage = InMemorySessionStorage::new();
        let rx = storage.subscribe();
        storage.clear().await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::in_dir(dir.path());
        assert!(storage.path().ends_with("plangate.session.json"));
        assert_eq!(storage.read().await.unwrap(), None);

        storage.write("first").await.unwrap();
        storage.write("second").await.unwrap();
        assert_eq!(storage.read().await.unwrap().as_deref(), Some("second"));
        assert!(!storage.temp_path().exists());

        // A second handle on the same file sees the same slot.
        let reopened = FileSessionStorage::in_dir(dir.path());
        assert_eq!(reopened.read().await.unwrap().as_deref(), Some("second"));

        storage.clear().await.unwrap();
        assert_eq!(reopened.read().await.unwrap(), None);
        storage.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::in_dir(dir.path().join("nested/state"));
        let mut rx = storage.subscribe();

        storage.write("v").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(storage.read().await.unwrap().as_deref(), Some("v"));
    }
}
