use thiserror::Error;

/// Classified outcome of a failed auth operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account exists for this email - contact an administrator")]
    AccountNotFound,

    #[error("Unauthorized - token rejected")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist session: {0}")]
    Storage(String),

    #[error("Request cancelled - session changed while it was in flight")]
    Cancelled,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Which backend call produced a status; login classifies 401/404 differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Verify,
    Refresh,
    Roles,
}

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(endpoint: Endpoint, status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match (endpoint, status.as_u16()) {
            (Endpoint::Login, 401 | 403) => AuthError::InvalidCredentials,
            (Endpoint::Login, 404) => AuthError::AccountNotFound,
            (_, 401 | 403) => AuthError::Unauthorized,
            (_, 500..=599) => AuthError::Server(truncated),
            _ => AuthError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True for failures that mean the stored credentials are no longer usable.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized)
    }

    /// Message suitable for showing to the user on the login screen.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::AccountNotFound => {
                "No account found for this email. Please contact your administrator.".to_string()
            }
            AuthError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            AuthError::Cancelled => "Login was cancelled.".to_string(),
            other => format!("Login failed: {}", other),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::InvalidResponse(e.to_string())
        } else {
            AuthError::Network(e.to_string())
        }
    }
}
