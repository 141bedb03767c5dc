use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::models::{Session, User};

use super::{SessionStore, StoredSession};

const SERVICE_NAME: &str = "crewdeck";

/// Keychain account the session record is stored under
const SESSION_ACCOUNT: &str = "session";

/// Session persisted as a single entry in the OS keychain.
///
/// The whole record is one secret, so a write either lands completely or
/// not at all.
pub struct KeyringSessionStore {
    service: String,
    entry: Entry,
}

impl KeyringSessionStore {
    pub fn new() -> Result<Self> {
        Self::with_names(SERVICE_NAME, SESSION_ACCOUNT)
    }

    /// Use a custom service/account pair, e.g. one per backend profile.
    pub fn with_names(service: &str, account: &str) -> Result<Self> {
        let entry = Entry::new(service, account).context("Failed to create keyring entry")?;
        Ok(Self {
            service: service.to_string(),
            entry,
        })
    }
}

impl SessionStore for KeyringSessionStore {
    fn save(&self, session: &Session, user: &User) -> Result<()> {
        let contents = serde_json::to_string(&StoredSession::new(session, user))?;
        self.entry
            .set_password(&contents)
            .context("Failed to store session in keychain")?;
        debug!(service = %self.service, "Session saved to keychain");
        Ok(())
    }

    fn load(&self) -> Result<Option<(Session, User)>> {
        let contents = match self.entry.get_password() {
            Ok(contents) => contents,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session from keychain"),
        };

        match serde_json::from_str::<StoredSession>(&contents) {
            Ok(stored) if stored.is_complete() => Ok(Some(stored.into_parts())),
            _ => {
                warn!("Keychain session entry is incomplete, discarding it");
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleSet;

    fn mock_store() -> KeyringSessionStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringSessionStore::with_names("crewdeck-test", "session").expect("mock entry")
    }

    fn sample() -> (Session, User) {
        let mut user = User::new("u-1", "a@x.com").with_display_name("Ada");
        user.roles = ["staff"].into_iter().collect::<RoleSet>();
        (Session::new("acc", "ref", Some(900)), user)
    }

    #[test]
    fn test_keychain_round_trip() {
        let store = mock_store();
        let (session, user) = sample();

        assert!(store.load().expect("load").is_none());
        store.save(&session, &user).expect("save");
        assert_eq!(store.load().expect("load"), Some((session, user)));
    }

    #[test]
    fn test_keychain_clear_is_idempotent() {
        let store = mock_store();
        let (session, user) = sample();

        store.save(&session, &user).expect("save");
        store.clear().expect("first clear");
        store.clear().expect("second clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn test_keychain_partial_record_is_discarded() {
        let store = mock_store();
        store
            .entry
            .set_password(r#"{"access_token": "acc", "refresh_token": ""}"#)
            .expect("write partial");

        assert!(store.load().expect("load").is_none());
        assert!(matches!(
            store.entry.get_password(),
            Err(keyring::Error::NoEntry)
        ));
    }
}
