//! Refresh policies.
//!
//! A provider's [`TokenPolicy`] says *when* its token must be refreshed
//! ([`RefreshTrigger`]) and *how* ([`TokenRefresher`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openusage_core::Credential;
use thiserror::Error;

use super::jwt;
use crate::context::ProbeContext;

/// Expiry-based policies refresh this long before the token expires.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Age-based policies refresh tokens older than this.
pub const MAX_TOKEN_AGE: Duration = Duration::from_secs(8 * 24 * 60 * 60);

// ============================================================================
// Trigger
// ============================================================================

/// When a token needs refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Refresh once `now + buffer` reaches the expiry.
    Expiry {
        /// Safety margin before the expiry.
        buffer: Duration,
    },
    /// Refresh once the last refresh is older than `max_age`.
    Age {
        /// Maximum token age.
        max_age: Duration,
    },
}

impl RefreshTrigger {
    /// Expiry-based with the default 5 minute buffer.
    pub fn expiry() -> Self {
        Self::Expiry {
            buffer: EXPIRY_BUFFER,
        }
    }

    /// Age-based with the default 8 day limit.
    pub fn age() -> Self {
        Self::Age {
            max_age: MAX_TOKEN_AGE,
        }
    }

    /// Whether `credential` must be refreshed before use.
    ///
    /// A credential without an access token always needs a refresh.
    pub fn needs_refresh(&self, credential: &Credential, now_ms: i64) -> bool {
        let Some(token) = credential.bearer() else {
            return true;
        };
        match self {
            Self::Expiry { buffer } => {
                let expires_at = credential
                    .expires_at_ms
                    .or_else(|| jwt::expires_at_ms(token));
                needs_refresh_by_expiry(now_ms, expires_at, duration_ms(*buffer))
            }
            Self::Age { max_age } => match credential.last_refreshed_at_ms {
                Some(last) => now_ms.saturating_sub(last) > duration_ms(*max_age),
                None => true,
            },
        }
    }
}

/// `true` when the expiry is unknown or `now + buffer >= expires_at`.
pub fn needs_refresh_by_expiry(now_ms: i64, expires_at_ms: Option<i64>, buffer_ms: i64) -> bool {
    match expires_at_ms {
        Some(expires_at) => now_ms.saturating_add(buffer_ms) >= expires_at,
        None => true,
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// Refresher
// ============================================================================

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: String,
    /// Rotated refresh token, if the server issued one.
    pub refresh_token: Option<String>,
    /// New identity token, if issued.
    pub id_token: Option<String>,
    /// Absolute expiry, if the server reported one.
    pub expires_at_ms: Option<i64>,
}

impl TokenGrant {
    /// A grant carrying only an access token.
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            expires_at_ms: None,
        }
    }

    /// Returns `credential` updated with this grant.
    ///
    /// The refresh token is only replaced when a new one was issued. When no
    /// expiry was reported it is read from the token's `exp` claim.
    pub fn apply(self, credential: &Credential, now_ms: i64) -> Credential {
        let expires_at_ms = self
            .expires_at_ms
            .or_else(|| jwt::expires_at_ms(&self.access_token));
        Credential {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token.or_else(|| credential.refresh_token.clone()),
            id_token: self.id_token.or_else(|| credential.id_token.clone()),
            expires_at_ms,
            last_refreshed_at_ms: Some(now_ms),
            ..credential.clone()
        }
    }
}

/// The server refused the refresh token; the user has to sign in again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Refresh rejected: {reason}")]
pub struct RefreshRejected {
    /// Server-provided error code or description.
    pub reason: String,
}

/// Exchanges a refresh token for new tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Attempts a refresh.
    ///
    /// - `Ok(Some(grant))`: new tokens.
    /// - `Ok(None)`: soft failure (network, malformed response, no refresh
    ///   token); callers keep using the old token.
    /// - `Err(_)`: the server explicitly rejected the refresh token.
    async fn refresh(
        &self,
        ctx: &ProbeContext,
        credential: &Credential,
    ) -> Result<Option<TokenGrant>, RefreshRejected>;
}

/// A provider's refresh policy.
#[derive(Clone)]
pub struct TokenPolicy {
    /// When to refresh.
    pub trigger: RefreshTrigger,
    /// How to refresh.
    pub refresher: Arc<dyn TokenRefresher>,
}

impl TokenPolicy {
    /// Creates a policy.
    pub fn new(trigger: RefreshTrigger, refresher: impl TokenRefresher + 'static) -> Self {
        Self {
            trigger,
            refresher: Arc::new(refresher),
        }
    }
}

impl std::fmt::Debug for TokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPolicy")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_core::{CredentialSource, ProviderId};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn cred(expires_at_ms: Option<i64>) -> Credential {
        let mut c = Credential::new(ProviderId::Claude, "a1", CredentialSource::File);
        c.expires_at_ms = expires_at_ms;
        c
    }

    #[test]
    fn test_expiry_buffer_boundary() {
        let trigger = RefreshTrigger::expiry();
        let buffer = 5 * 60 * 1000;
        assert!(!trigger.needs_refresh(&cred(Some(NOW + buffer + 1)), NOW));
        assert!(trigger.needs_refresh(&cred(Some(NOW + buffer)), NOW));
        assert!(trigger.needs_refresh(&cred(Some(NOW - 1)), NOW));
    }

    #[test]
    fn test_unknown_expiry_always_refreshes() {
        assert!(RefreshTrigger::expiry().needs_refresh(&cred(None), NOW));
        assert!(needs_refresh_by_expiry(NOW, None, 0));
    }

    #[test]
    fn test_expiry_from_jwt_claim() {
        let token = jwt::make_token(&json!({"exp": (NOW / 1000) + 3600}));
        let c = Credential::new(ProviderId::Cursor, token, CredentialSource::Database);
        assert!(!RefreshTrigger::expiry().needs_refresh(&c, NOW));
        assert!(RefreshTrigger::expiry().needs_refresh(&c, NOW + 3_400_000));
    }

    #[test]
    fn test_missing_access_token_always_refreshes() {
        let mut c = cred(Some(NOW + 10_000_000));
        c.access_token = None;
        c.refresh_token = Some("r1".into());
        assert!(RefreshTrigger::expiry().needs_refresh(&c, NOW));
    }

    #[test]
    fn test_age_trigger() {
        let trigger = RefreshTrigger::age();
        let eight_days = 8 * 24 * 3600 * 1000;
        let mut c = cred(None);
        assert!(trigger.needs_refresh(&c, NOW));
        c.last_refreshed_at_ms = Some(NOW - eight_days);
        assert!(!trigger.needs_refresh(&c, NOW));
        c.last_refreshed_at_ms = Some(NOW - eight_days - 1);
        assert!(trigger.needs_refresh(&c, NOW));
    }

    #[test]
    fn test_grant_keeps_refresh_token_when_not_rotated() {
        let mut c = cred(Some(NOW));
        c.refresh_token = Some("r1".into());
        let updated = TokenGrant {
            expires_at_ms: Some(NOW + 3_600_000),
            ..TokenGrant::access_only("a2")
        }
        .apply(&c, NOW);
        assert_eq!(updated.access_token.as_deref(), Some("a2"));
        assert_eq!(updated.refresh_token.as_deref(), Some("r1"));
        assert_eq!(updated.expires_at_ms, Some(NOW + 3_600_000));
        assert_eq!(updated.last_refreshed_at_ms, Some(NOW));

        let rotated = TokenGrant {
            refresh_token: Some("r2".into()),
            ..TokenGrant::access_only("a3")
        }
        .apply(&updated, NOW);
        assert_eq!(rotated.refresh_token.as_deref(), Some("r2"));
        assert_eq!(rotated.expires_at_ms, None);
    }
}
