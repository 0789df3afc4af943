use std::{
    fmt,
    time::{Duration, SystemTime},
};

use veil::Redact;

/// Bearer token with its absolute expiry.
///
/// A token is only valid strictly before `expires_at`. The expiry is pulled
/// forward by [`AuthToken::EXPIRY_MARGIN`] from what the service granted, so
/// that a request sent just before expiry does not arrive just after it.
#[derive(Clone, PartialEq, Eq, Hash, Redact)]
pub struct AuthToken {
    #[redact]
    token: String,
    expires_at: SystemTime,
}

impl AuthToken {
    pub const EXPIRY_MARGIN: Duration = Duration::from_secs(15);

    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Token issued at `issued_at` for `lifetime`, minus the safety margin.
    #[must_use]
    pub fn issued(token: impl Into<String>, issued_at: SystemTime, lifetime: Duration) -> Self {
        let expires_at = issued_at + lifetime.saturating_sub(Self::EXPIRY_MARGIN);
        Self::new(token, expires_at)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(SystemTime::now())
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}
