use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::{Session, User};

use super::{SessionStore, StoredSession};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Scratch file the next record is written to before it replaces the old one
const SESSION_TEMP_FILE: &str = "session.json.tmp";

/// Session persisted as one JSON document in the cache directory.
///
/// Writes go to a temp file that is renamed over the real one, so a crash
/// mid-write leaves the previous record intact.
pub struct FileSessionStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_TEMP_FILE)
    }

    /// Serialize access to the file for the lifetime of the guard.
    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_if_exists(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, session: &Session, user: &User) -> Result<()> {
        let _guard = self.acquire();

        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let contents = serde_json::to_string_pretty(&StoredSession::new(session, user))?;

        let temp = self.temp_path();
        let written = std::fs::write(&temp, contents)
            .context("Failed to write session file")
            .and_then(|()| {
                std::fs::rename(&temp, self.path()).context("Failed to replace session file")
            });
        if written.is_err() {
            // Leave the previous record as it was
            if let Err(e) = Self::remove_if_exists(&temp) {
                debug!(error = %e, "Failed to remove temp session file");
            }
        }
        written?;

        debug!(path = %self.path().display(), "Session saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<(Session, User)>> {
        let _guard = self.acquire();

        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        match serde_json::from_str::<StoredSession>(&contents) {
            Ok(stored) if stored.is_complete() => Ok(Some(stored.into_parts())),
            Ok(_) => {
                warn!("Session file is missing a token, discarding it");
                Self::remove_if_exists(&path)?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Session file is unreadable, discarding it");
                Self::remove_if_exists(&path)?;
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.acquire();
        Self::remove_if_exists(&self.temp_path())?;
        Self::remove_if_exists(&self.path())?;
        debug!("Session file cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleSet;

    fn sample() -> (Session, User) {
        let mut user = User::new("u-1", "a@x.com").with_display_name("Ada");
        user.roles = ["staff", "manager"].into_iter().collect::<RoleSet>();
        (Session::new("acc", "ref", Some(900)), user)
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        let (session, user) = sample();

        store.save(&session, &user).expect("save");
        let loaded = store.load().expect("load").expect("record present");

        assert_eq!(loaded, (session, user));
        assert!(!dir.path().join(SESSION_TEMP_FILE).exists());
    }

    #[test]
    fn test_failed_replace_cleans_up_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        let (session, user) = sample();

        // A directory in the way makes the rename fail
        std::fs::create_dir(dir.path().join(SESSION_FILE)).expect("blocker");

        assert!(store.save(&session, &user).is_err());
        assert!(!dir.path().join(SESSION_TEMP_FILE).exists());
        assert!(dir.path().join(SESSION_FILE).is_dir());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path().join("nested"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn test_save_creates_cache_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path().join("a").join("b"));
        let (session, user) = sample();
        store.save(&session, &user).expect("save");
        assert!(store.path().exists());
    }

    #[test]
    fn test_clear_removes_record_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        let (session, user) = sample();

        store.save(&session, &user).expect("save");
        store.clear().expect("first clear");
        store.clear().expect("second clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn test_partial_record_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), r#"{"access_token": "acc", "refresh_token": "ref"}"#)
            .expect("write partial");

        assert!(store.load().expect("load").is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_record_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), "{not json").expect("write corrupt");

        assert!(store.load().expect("load").is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_replaces_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path());
        let (session, user) = sample();
        store.save(&session, &user).expect("save");

        let rotated = Session::new("acc-2", "ref-2", None);
        store.save(&rotated, &user).expect("save rotated");

        let (loaded, _) = store.load().expect("load").expect("record present");
        assert_eq!(loaded.access_token, "acc-2");
        assert_eq!(loaded.refresh_token, "ref-2");
    }
}
