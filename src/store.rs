//! Short-lived storage of authorization secrets.
//!
//! The authorization round trip spans a browser redirect, so the PKCE
//! verifier and state nonce must outlive the process that started it. The
//! bearer token is kept alongside so that a session can be resumed until it
//! expires. Nothing else is persisted.
//!
//! [`FileStore`] keeps everything in a small TOML file that is readable by
//! the owner only; [`MemoryStore`] is for embedding and tests.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use veil::Redact;

use crate::error::{Error, Result};

/// Everything that survives between runs.
#[serde_as]
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize, Redact)]
pub struct Stored {
    #[redact]
    pub pkce_verifier: Option<String>,
    #[redact]
    pub oauth_state: Option<String>,
    #[redact]
    pub token: Option<String>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    pub token_expiry: Option<SystemTime>,
}

pub trait SessionStore: Send + Sync {
    /// Reads the stored secrets; an absent store reads as empty.
    fn load(&self) -> Result<Stored>;

    fn save(&self, stored: &Stored) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    stored: Mutex<Stored>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(stored: Stored) -> Self {
        Self {
            stored: Mutex::new(stored),
        }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Stored> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, stored: &Stored) -> Result<()> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = stored.clone();
        Ok(())
    }
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Prevent out-of-memory condition: the session file should be small.
    const MAX_FILE_SIZE: u64 = 4096;

    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Stored> {
        let file_size = match fs::metadata(&self.path) {
            Ok(attributes) => attributes.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Stored::default()),
            Err(e) => return Err(e.into()),
        };

        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large",
                self.path.display()
            )));
        }

        let contents = fs::read_to_string(&self.path)?;
        toml::from_str(&contents).map_err(Into::into)
    }

    fn save(&self, stored: &Stored) -> Result<()> {
        let contents = toml::to_string(stored)?;
        fs::write(&self.path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        trace!("saved session to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.toml"));
        assert_eq!(store.load().unwrap(), Stored::default());
    }

    #[test]
    fn file_store_keeps_secrets_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let expiry = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        let stored = Stored {
            pkce_verifier: Some("verifier".to_owned()),
            oauth_state: Some("state".to_owned()),
            token: Some("token".to_owned()),
            token_expiry: Some(expiry),
        };
        FileStore::new(&path).save(&stored).unwrap();

        let loaded = FileStore::new(&path).load().unwrap();
        assert_eq!(loaded, stored);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "x".repeat(8192)).unwrap();

        assert!(FileStore::new(&path).load().is_err());
    }
}
