//! Remote copy of the application snapshot.
//!
//! The remote is addressed per user id and only ever stores whole
//! documents. All calls are asynchronous; everything around them is not.

use crate::snapshot::AppSnapshot;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Remote document storage keyed by user id
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the remote has been set up at all
    fn is_configured(&self) -> bool {
        true
    }

    /// Whether the remote can be reached right now
    fn is_online(&self) -> bool {
        true
    }

    /// Fetch the stored document, `None` for an account never pushed
    async fn get_state(&self, user_id: &str) -> Result<Option<AppSnapshot>>;

    /// Overwrite the stored document
    async fn set_state(&self, user_id: &str, snapshot: &AppSnapshot) -> Result<()>;
}

/// Remote backed by a directory of `<user_id>.json` documents, such as a
/// mounted network share or a synced folder
#[derive(Clone, Debug, Default)]
pub struct DirRemoteStore {
    root: Option<PathBuf>,
}

impl DirRemoteStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn document_path(&self, user_id: &str) -> Result<PathBuf> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| Error::Remote("no remote directory configured".into()))?;
        if user_id.is_empty() || user_id.contains(['/', '\\']) || user_id.starts_with('.') {
            return Err(Error::Remote(format!("invalid user id: {:?}", user_id)));
        }
        Ok(root.join(format!("{}.json", user_id)))
    }
}

#[async_trait]
impl RemoteStore for DirRemoteStore {
    fn is_configured(&self) -> bool {
        self.root.is_some()
    }

    fn is_online(&self) -> bool {
        self.root.as_deref().is_some_and(Path::is_dir)
    }

    async fn get_state(&self, user_id: &str) -> Result<Option<AppSnapshot>> {
        let path = self.document_path(user_id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No remote document at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(Error::Remote(format!("read {:?}: {}", path, e))),
        };

        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| Error::Remote(format!("remote document {:?} is unreadable: {}", path, e)))?;
        Ok(Some(snapshot))
    }

    async fn set_state(&self, user_id: &str, snapshot: &AppSnapshot) -> Result<()> {
        let path = self.document_path(user_id)?;
        let contents = serde_json::to_string(snapshot)?;

        // Write beside the target, then rename over it
        let staging = path.with_extension("json.partial");
        tokio::fs::write(&staging, contents)
            .await
            .map_err(|e| Error::Remote(format!("write {:?}: {}", staging, e)))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| Error::Remote(format!("replace {:?}: {}", path, e)))?;

        tracing::debug!("Pushed snapshot for {} to {:?}", user_id, path);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_and_offline() {
        let unconfigured = DirRemoteStore::new(None);
        assert!(!unconfigured.is_configured());
        assert!(!unconfigured.is_online());

        let temp_dir = tempfile::tempdir().unwrap();
        let missing = DirRemoteStore::new(Some(temp_dir.path().join("not-mounted")));
        assert!(missing.is_configured());
        assert!(!missing.is_online());
    }

    #[tokio::test]
    async fn test_dir_remote_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = DirRemoteStore::new(Some(temp_dir.path().to_path_buf()));
        assert!(remote.is_online());

        assert_eq!(remote.get_state("alice").await.unwrap(), None);

        let snapshot = AppSnapshot::new_user(123);
        remote.set_state("alice", &snapshot).await.unwrap();
        assert_eq!(remote.get_state("alice").await.unwrap(), Some(snapshot));
        assert!(temp_dir.path().join("alice.json").exists());
        assert!(!temp_dir.path().join("alice.json.partial").exists());
    }

    #[tokio::test]
    async fn test_dir_remote_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("bob.json"), "garbage").unwrap();
        let remote = DirRemoteStore::new(Some(temp_dir.path().to_path_buf()));

        assert!(matches!(remote.get_state("bob").await, Err(Error::Remote(_))));
        assert!(matches!(remote.get_state("../bob").await, Err(Error::Remote(_))));
    }
}
