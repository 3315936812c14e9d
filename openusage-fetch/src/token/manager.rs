//! Refresh coordination.
//!
//! Refreshes for the same provider are serialized by a per-provider
//! single-flight guard. A caller that waited on the guard while another
//! caller refreshed the very same token pair adopts that result instead of
//! spending the refresh token a second time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use openusage_core::{Credential, ProviderId};
use tracing::{debug, info, instrument, warn};

use super::policy::{RefreshRejected, TokenPolicy};
use crate::context::ProbeContext;
use crate::credential::{CredentialStore, ResolvedCredential};

/// Why a refresh is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// Before the first request, because the policy says the token is stale.
    Proactive,
    /// After the server rejected the token.
    Reactive,
}

/// What a refresh attempt did to the caller's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call refreshed the token and persisted it.
    Refreshed,
    /// Another caller had just refreshed the same token; its result was
    /// taken over.
    Adopted,
    /// Soft failure; the credential is unchanged.
    Unchanged,
}

impl RefreshOutcome {
    /// Whether the caller now holds a different token.
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug, Clone)]
struct LastRefresh {
    /// `(access, refresh)` the refresh started from.
    from: (Option<String>, Option<String>),
    credential: Credential,
}

type Slot = Arc<tokio::sync::Mutex<Option<LastRefresh>>>;

/// Process-wide refresh coordinator shared through the probe context.
#[derive(Debug, Default)]
pub struct TokenManager {
    slots: Mutex<HashMap<ProviderId, Slot>>,
}

impl TokenManager {
    /// Creates a coordinator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, provider: ProviderId) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(provider)
            .or_default()
            .clone()
    }

    /// Refreshes `current` under the provider's guard.
    ///
    /// On success the new credential is persisted through `store` (a failed
    /// write is logged, the new token is still used) and written into
    /// `current`.
    #[instrument(skip_all, fields(provider = %store.provider(), phase = ?phase))]
    pub async fn refresh(
        &self,
        ctx: &ProbeContext,
        store: &CredentialStore,
        policy: &TokenPolicy,
        current: &mut ResolvedCredential,
        phase: RefreshPhase,
    ) -> Result<RefreshOutcome, RefreshRejected> {
        let slot = self.slot(store.provider());
        let mut last = slot.lock().await;

        let from = (
            current.credential.access_token.clone(),
            current.credential.refresh_token.clone(),
        );
        if let Some(done) = last.as_ref() {
            if done.from == from && done.credential.access_token != current.credential.access_token {
                debug!("Adopting credential refreshed by a concurrent probe");
                current.credential = done.credential.clone();
                return Ok(RefreshOutcome::Adopted);
            }
        }

        let Some(grant) = policy.refresher.refresh(ctx, &current.credential).await? else {
            debug!("Refresh produced no new token");
            return Ok(RefreshOutcome::Unchanged);
        };

        current.credential = grant.apply(&current.credential, ctx.now_ms());
        if let Err(e) = store.persist(ctx, current).await {
            warn!(error = %e, "Failed to persist refreshed credential");
        }
        info!("Token refreshed");

        *last = Some(LastRefresh {
            from,
            credential: current.credential.clone(),
        });
        Ok(RefreshOutcome::Refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialCodec, FileBackend, FileLocation};
    use crate::testing::TestHost;
    use crate::token::{RefreshTrigger, TokenGrant, TokenRefresher};
    use async_trait::async_trait;
    use openusage_core::CredentialSource;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Codec;

    impl CredentialCodec for Codec {
        fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
            credential.access_token = document["access"].as_str().map(String::from);
            credential.refresh_token = document["refresh"].as_str().map(String::from);
            Some(credential)
        }

        fn encode(&self, credential: &Credential) -> Value {
            json!({"access": credential.access_token, "refresh": credential.refresh_token})
        }
    }

    /// Issues `a<n>` after a short delay and counts calls.
    struct Counting {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl TokenRefresher for Counting {
        async fn refresh(
            &self,
            _ctx: &ProbeContext,
            _credential: &Credential,
        ) -> Result<Option<TokenGrant>, RefreshRejected> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 2;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.reject {
                return Err(RefreshRejected {
                    reason: "invalid_grant".into(),
                });
            }
            Ok(Some(TokenGrant::access_only(format!("a{n}"))))
        }
    }

    fn store() -> CredentialStore {
        CredentialStore::new(ProviderId::Claude, Arc::new(Codec)).backend(FileBackend::json(
            FileLocation::ProviderData {
                provider: ProviderId::Claude,
                file: "auth.json",
            },
        ))
    }

    fn resolved() -> ResolvedCredential {
        let mut credential = Credential::new(ProviderId::Claude, "a1", CredentialSource::File);
        credential.refresh_token = Some("r1".into());
        ResolvedCredential {
            credential,
            origin: 0,
        }
    }

    fn policy(reject: bool) -> (TokenPolicy, Arc<Counting>) {
        let counting = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            reject,
        });
        let policy = TokenPolicy {
            trigger: RefreshTrigger::expiry(),
            refresher: counting.clone(),
        };
        (policy, counting)
    }

    #[tokio::test]
    async fn test_refresh_persists() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), 1_000);
        let (policy, counting) = policy(false);
        let store = store();
        let mut current = resolved();

        let outcome = host
            .ctx
            .tokens
            .refresh(&host.ctx, &store, &policy, &mut current, RefreshPhase::Proactive)
            .await
            .unwrap();

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(current.credential.bearer(), Some("a2"));
        assert_eq!(current.credential.refresh(), Some("r1"));
        assert_eq!(current.credential.last_refreshed_at_ms, Some(1_000));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        let stored = store.resolve(&host.ctx).await.unwrap();
        assert_eq!(stored.credential.bearer(), Some("a2"));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), 1_000);
        let (policy, counting) = policy(false);
        let store = store();
        let mut first = resolved();
        let mut second = resolved();

        let (a, b) = tokio::join!(
            host.ctx
                .tokens
                .refresh(&host.ctx, &store, &policy, &mut first, RefreshPhase::Proactive),
            host.ctx
                .tokens
                .refresh(&host.ctx, &store, &policy, &mut second, RefreshPhase::Reactive),
        );

        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, RefreshOutcome::Adopted));
        assert_eq!(outcomes, vec![RefreshOutcome::Refreshed, RefreshOutcome::Adopted]);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.credential.bearer(), Some("a2"));
        assert_eq!(second.credential.bearer(), Some("a2"));
    }

    #[tokio::test]
    async fn test_holder_of_new_token_refreshes_again() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), 1_000);
        let (policy, counting) = policy(false);
        let store = store();
        let mut current = resolved();

        let tokens = &host.ctx.tokens;
        tokens
            .refresh(&host.ctx, &store, &policy, &mut current, RefreshPhase::Proactive)
            .await
            .unwrap();
        let outcome = tokens
            .refresh(&host.ctx, &store, &policy, &mut current, RefreshPhase::Reactive)
            .await
            .unwrap();

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
        assert_eq!(current.credential.bearer(), Some("a3"));
    }

    #[tokio::test]
    async fn test_rejection_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), 1_000);
        let (policy, _) = policy(true);
        let store = store();
        let mut current = resolved();

        let err = host
            .ctx
            .tokens
            .refresh(&host.ctx, &store, &policy, &mut current, RefreshPhase::Proactive)
            .await
            .unwrap_err();
        assert_eq!(err.reason, "invalid_grant");
        assert_eq!(current.credential.bearer(), Some("a1"));
        assert!(store.resolve(&host.ctx).await.is_none());
    }
}
