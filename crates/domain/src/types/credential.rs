//! Bearer credentials

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::realm::Realm;

/// A bearer token for one realm.
///
/// Held only in process memory. `Debug` output never includes the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub realm: Realm,
    access_token: String,
    /// `None` means the token never expires (pre-issued development tokens)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        realm: Realm,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { realm, access_token: access_token.into(), expires_at }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// True while `now < expires_at - safety_margin`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at - safety_margin,
            None => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("realm", &self.realm)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
