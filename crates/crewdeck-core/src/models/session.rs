use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Buffer before expiry at which a token should be refreshed (60 seconds)
const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

/// Bearer credentials issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    /// Lifetime of the access token in seconds, when the backend reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at: Utc::now(),
            expires_in,
        }
    }

    /// Absolute expiry. A hint too large to represent counts as no hint.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = Duration::try_seconds(self.expires_in?)?;
        self.issued_at.checked_add_signed(lifetime)
    }

    /// A session without an expiry hint is never considered expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at()
            .map(|expiry| Utc::now() > expiry)
            .unwrap_or(false)
    }

    /// Check if the access token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.expires_at()
            .and_then(|expiry| {
                expiry.checked_sub_signed(Duration::seconds(TOKEN_REFRESH_BUFFER_SECS))
            })
            .map(|refresh_at| Utc::now() > refresh_at)
            .unwrap_or(false)
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at().map(|expiry| expiry - Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued_ago(secs: i64, expires_in: Option<i64>) -> Session {
        let mut session = Session::new("access", "refresh", expires_in);
        session.issued_at = Utc::now() - Duration::seconds(secs);
        session
    }

    #[test]
    fn test_fresh_session_is_valid() {
        let session = Session::new("access", "refresh", Some(900));
        assert!(!session.is_expired());
        assert!(!session.needs_refresh());
        let remaining = session.time_until_expiry().expect("expiry hint set");
        assert!(remaining.num_seconds() > 890);
    }

    #[test]
    fn test_session_needs_refresh_inside_buffer() {
        let session = issued_ago(870, Some(900));
        assert!(session.needs_refresh());
        assert!(!session.is_expired());
    }

    #[test]
    fn test_session_expired() {
        let session = issued_ago(901, Some(900));
        assert!(session.is_expired());
        assert!(session.needs_refresh());
    }

    #[test]
    fn test_session_without_hint_never_expires() {
        let session = issued_ago(86_400, None);
        assert!(!session.is_expired());
        assert!(!session.needs_refresh());
        assert!(session.expires_at().is_none());
    }

    #[test]
    fn test_out_of_range_hint_is_ignored() {
        for secs in [i64::MAX, i64::MIN, 1_000_000_000_000_000] {
            let session = Session::new("access", "refresh", Some(secs));
            assert!(session.expires_at().is_none());
            assert!(!session.is_expired());
            assert!(!session.needs_refresh());
            assert!(session.time_until_expiry().is_none());
        }
    }
}
