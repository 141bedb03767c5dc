use std::sync::Mutex;

use anyhow::Result;

use crate::models::{Session, User};

use super::{SessionStore, StoredSession};

/// Session kept in process memory only.
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already stored, as if left by a previous run.
    pub fn with_session(session: &Session, user: &User) -> Self {
        Self {
            record: Mutex::new(Some(StoredSession::new(session, user))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session, user: &User) -> Result<()> {
        let mut record = self.record.lock().unwrap_or_else(|p| p.into_inner());
        *record = Some(StoredSession::new(session, user));
        Ok(())
    }

    fn load(&self) -> Result<Option<(Session, User)>> {
        let record = self.record.lock().unwrap_or_else(|p| p.into_inner());
        Ok(record.clone().map(StoredSession::into_parts))
    }

    fn clear(&self) -> Result<()> {
        let mut record = self.record.lock().unwrap_or_else(|p| p.into_inner());
        *record = None;
        Ok(())
    }
}
