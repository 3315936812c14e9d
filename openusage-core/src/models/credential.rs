//! OAuth credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

// ============================================================================
// Credential Source
// ============================================================================

/// The kind of backend a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// An OS secret-store entry owned by this application.
    OwnedKeychain,
    /// An OS secret-store entry written by the provider's own tooling.
    ForeignKeychain,
    /// A JSON or YAML file on disk.
    File,
    /// A key/value table in a local SQLite database.
    Database,
    /// A device-authorization grant that has not been stored yet.
    DeviceFlow,
}

impl CredentialSource {
    /// Short human-readable label, used in logs and `providers` output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OwnedKeychain => "keychain",
            Self::ForeignKeychain => "foreign keychain",
            Self::File => "file",
            Self::Database => "database",
            Self::DeviceFlow => "device flow",
        }
    }
}

// ============================================================================
// Credential
// ============================================================================

/// A provider-scoped OAuth credential.
///
/// `document` keeps the backend's original JSON so that a refreshed
/// credential can be merged back without dropping fields this crate does not
/// model.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Owning provider.
    pub provider: ProviderId,
    /// Bearer token. `None` when only a refresh token is stored.
    pub access_token: Option<String>,
    /// Refresh token, if the provider issues one.
    pub refresh_token: Option<String>,
    /// OpenID identity token, when the provider issues one alongside.
    pub id_token: Option<String>,
    /// Absolute expiry of the access token in epoch milliseconds.
    pub expires_at_ms: Option<i64>,
    /// When the token was last refreshed, for age-based policies.
    pub last_refreshed_at_ms: Option<i64>,
    /// Opaque account identifier passed through to API calls.
    pub account_id: Option<String>,
    /// Opaque subscription/plan hint.
    pub subscription_type: Option<String>,
    /// Backend this credential came from.
    pub source: CredentialSource,
    /// Original stored document.
    #[serde(default)]
    pub document: serde_json::Value,
}

impl Credential {
    /// Creates a credential holding only an access token.
    pub fn new(provider: ProviderId, access_token: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            provider,
            access_token: Some(access_token.into()),
            refresh_token: None,
            id_token: None,
            expires_at_ms: None,
            last_refreshed_at_ms: None,
            account_id: None,
            subscription_type: None,
            source,
            document: serde_json::Value::Null,
        }
    }

    /// Creates a credential with no tokens, for codecs to fill in.
    pub fn empty(provider: ProviderId, source: CredentialSource) -> Self {
        Self {
            access_token: None,
            ..Self::new(provider, String::new(), source)
        }
    }

    /// Returns the access token if it is present and non-empty.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns the refresh token if it is present and non-empty.
    pub fn refresh(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Whether this credential can be used at all: it has an access token or
    /// a way to obtain one.
    pub fn is_usable(&self) -> bool {
        self.bearer().is_some() || self.refresh().is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at_ms", &self.expires_at_ms)
            .field("last_refreshed_at_ms", &self.last_refreshed_at_ms)
            .field("account_id", &self.account_id)
            .field("subscription_type", &self.subscription_type)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_tokens() {
        let mut cred = Credential::new(ProviderId::Claude, "sk-secret", CredentialSource::File);
        cred.refresh_token = Some("rt-secret".into());
        let out = format!("{cred:?}");
        assert!(!out.contains("sk-secret"));
        assert!(!out.contains("rt-secret"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn test_usable_with_refresh_only() {
        let mut cred = Credential::new(ProviderId::Codex, "", CredentialSource::File);
        assert!(cred.bearer().is_none());
        assert!(!cred.is_usable());
        cred.refresh_token = Some("r1".into());
        assert!(cred.is_usable());
    }
}
