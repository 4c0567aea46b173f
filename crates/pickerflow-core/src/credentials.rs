//! Credentials of the active account.

use serde::{Deserialize, Serialize};

/// Account identity and key used to authorize every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Service account identifier.
    pub account_id: String,
    /// Authorization scheme, e.g. `Bearer` or `AccountKey`.
    pub auth_scheme: String,
    /// Token or account key.
    pub auth_key: String,
}

impl Credentials {
    /// Create credentials for an account.
    pub fn new(
        account_id: impl Into<String>,
        auth_scheme: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            auth_scheme: auth_scheme.into(),
            auth_key: auth_key.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.auth_scheme, self.auth_key)
    }
}

// Keys never end up in logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("auth_scheme", &self.auth_scheme)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}
