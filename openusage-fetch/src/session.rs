//! Authenticated request sessions.
//!
//! An [`AuthSession`] owns the credential for one probe run. Opening it
//! resolves the credential (or advances the device flow) and applies at most
//! one proactive refresh. Requests sent through it get at most one reactive
//! recovery for the whole run: a 401/403 triggers a refresh (or, for
//! providers without a refresh policy, a reload from the store) and a single
//! retry, even when the reload finds the same token. A second rejection is final.

use openusage_core::{Credential, CredentialSource, ProviderId};
use tracing::{debug, instrument, warn};

use crate::classify::ProbeError;
use crate::context::ProbeContext;
use crate::credential::{CredentialStore, ResolvedCredential};
use crate::device_flow::DeviceFlow;
use crate::host::{HttpRequest, HttpResponse};
use crate::token::{RefreshPhase, TokenPolicy};

// ============================================================================
// Provider Auth
// ============================================================================

/// Everything a provider needs to authenticate.
#[derive(Debug, Clone)]
pub struct ProviderAuth {
    /// Where the credential lives.
    pub store: CredentialStore,
    /// Refresh policy; `None` for providers whose tokens do not expire.
    pub policy: Option<TokenPolicy>,
    /// Interactive sign-in when no credential is stored.
    pub device_flow: Option<DeviceFlow>,
    /// Message shown when no credential is found.
    pub sign_in_hint: String,
}

impl ProviderAuth {
    /// Auth backed only by `store`.
    pub fn new(store: CredentialStore, sign_in_hint: impl Into<String>) -> Self {
        Self {
            store,
            policy: None,
            device_flow: None,
            sign_in_hint: sign_in_hint.into(),
        }
    }

    /// Sets the refresh policy.
    #[must_use]
    pub fn policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Enables the device flow.
    #[must_use]
    pub fn device_flow(mut self, flow: DeviceFlow) -> Self {
        self.device_flow = Some(flow);
        self
    }

    /// Owning provider.
    pub fn provider(&self) -> ProviderId {
        self.store.provider()
    }

    fn not_signed_in(&self) -> ProbeError {
        ProbeError::NotAuthenticated(self.sign_in_hint.clone())
    }
}

// ============================================================================
// Auth Session
// ============================================================================

/// Credential plus refresh budget for one probe run.
#[derive(Debug)]
pub struct AuthSession<'a> {
    ctx: &'a ProbeContext,
    auth: &'a ProviderAuth,
    current: ResolvedCredential,
    recovered: bool,
}

impl<'a> AuthSession<'a> {
    /// Resolves a credential and refreshes it if the policy says so.
    #[instrument(skip_all, fields(provider = %auth.provider()))]
    pub async fn open(ctx: &'a ProbeContext, auth: &'a ProviderAuth) -> Result<Self, ProbeError> {
        let current = match auth.store.resolve(ctx).await {
            Some(resolved) => resolved,
            None => Self::sign_in(ctx, auth).await?,
        };

        let mut session = Self {
            ctx,
            auth,
            current,
            recovered: false,
        };
        session.refresh_if_stale().await?;

        if session.current.credential.bearer().is_none() {
            debug!("No access token after refresh attempt");
            return Err(auth.not_signed_in());
        }
        Ok(session)
    }

    async fn sign_in(
        ctx: &ProbeContext,
        auth: &ProviderAuth,
    ) -> Result<ResolvedCredential, ProbeError> {
        let Some(flow) = &auth.device_flow else {
            return Err(auth.not_signed_in());
        };
        let grant = flow.step(ctx).await?;
        let credential = grant.apply(
            &Credential::empty(auth.provider(), CredentialSource::DeviceFlow),
            ctx.now_ms(),
        );
        match auth.store.insert(ctx, credential.clone()).await {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                warn!(error = %e, "Failed to store device flow credential");
                Ok(ResolvedCredential {
                    credential,
                    origin: 0,
                })
            }
        }
    }

    async fn refresh_if_stale(&mut self) -> Result<(), ProbeError> {
        let Some(policy) = &self.auth.policy else {
            return Ok(());
        };
        if !policy
            .trigger
            .needs_refresh(&self.current.credential, self.ctx.now_ms())
        {
            return Ok(());
        }
        let outcome = self
            .ctx
            .tokens
            .refresh(
                self.ctx,
                &self.auth.store,
                policy,
                &mut self.current,
                RefreshPhase::Proactive,
            )
            .await
            .map_err(|rejected| ProbeError::ReAuthRequired(rejected.reason))?;
        debug!(?outcome, "Proactive refresh");
        Ok(())
    }

    /// The credential currently in use.
    pub fn credential(&self) -> &Credential {
        &self.current.credential
    }

    /// Sends a request built from the current credential.
    ///
    /// Non-auth error statuses are returned as responses for the caller to
    /// classify; transport failures become [`ProbeError::Network`].
    pub async fn send<F>(&mut self, build: F) -> Result<HttpResponse, ProbeError>
    where
        F: Fn(&Credential) -> HttpRequest,
    {
        let response = self.ctx.http.send(build(&self.current.credential)).await?;
        if !response.is_auth_failure() {
            return Ok(response);
        }
        if self.recovered {
            debug!(status = response.status, "Rejected again; refresh budget spent");
            return Err(ProbeError::AuthRetryExhausted);
        }
        self.recovered = true;

        if !self.recover(response.status).await? {
            return Err(ProbeError::AuthRetryExhausted);
        }

        let retry = self.ctx.http.send(build(&self.current.credential)).await?;
        if retry.is_auth_failure() {
            debug!(status = retry.status, "Retry rejected");
            if self.auth.policy.is_none() {
                self.auth.store.invalidate(self.ctx, &self.current).await;
            }
            return Err(ProbeError::AuthRetryExhausted);
        }
        Ok(retry)
    }

    /// Obtains a different token after a rejection. Returns whether one
    /// was found.
    #[instrument(skip(self), fields(provider = %self.auth.provider()))]
    async fn recover(&mut self, status: u16) -> Result<bool, ProbeError> {
        if let Some(policy) = &self.auth.policy {
            let outcome = self
                .ctx
                .tokens
                .refresh(
                    self.ctx,
                    &self.auth.store,
                    policy,
                    &mut self.current,
                    RefreshPhase::Reactive,
                )
                .await
                .map_err(|rejected| ProbeError::ReAuthRequired(rejected.reason))?;
            return Ok(outcome.changed() && self.current.credential.bearer().is_some());
        }

        // The retry goes out even when the store still holds the rejected
        // token; the entry is only dropped if that retry is rejected too.
        let rejected = self.current.credential.bearer().map(String::from);
        match self.auth.store.resolve(self.ctx).await {
            Some(reloaded) if reloaded.credential.bearer().map(String::from) != rejected => {
                debug!("Reloaded a different credential");
                self.current = reloaded;
            }
            _ => debug!("No newer credential stored, retrying once"),
        }
        Ok(self.current.credential.bearer().is_some())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialCodec, FileBackend, FileLocation, KeychainBackend};
    use crate::device_flow::DeviceFlowConfig;
    use crate::host::Method;
    use crate::testing::TestHost;
    use crate::token::{OAuthRefresher, RefreshTrigger};
    use openusage_core::ErrorKind;
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;
    const TOKEN_URL: &str = "https://auth.example.com/oauth/token";
    const USAGE_URL: &str = "https://api.example.com/usage";

    struct Codec;

    impl CredentialCodec for Codec {
        fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
            credential.access_token = document.get("access").and_then(Value::as_str).map(String::from);
            credential.refresh_token = document.get("refresh").and_then(Value::as_str).map(String::from);
            credential.expires_at_ms = document.get("expires").and_then(Value::as_i64);
            Some(credential)
        }

        fn encode(&self, credential: &Credential) -> Value {
            json!({
                "access": credential.access_token,
                "refresh": credential.refresh_token,
                "expires": credential.expires_at_ms,
            })
        }
    }

    fn auth_file(host: &TestHost) -> PathBuf {
        host.ctx.provider_data_dir(ProviderId::Claude).join("auth.json")
    }

    fn oauth_auth() -> ProviderAuth {
        let store = CredentialStore::new(ProviderId::Claude, Arc::new(Codec)).backend(
            FileBackend::json(FileLocation::ProviderData {
                provider: ProviderId::Claude,
                file: "auth.json",
            }),
        );
        ProviderAuth::new(store, "Sign in first.").policy(TokenPolicy::new(
            RefreshTrigger::expiry(),
            OAuthRefresher::json(TOKEN_URL, "client"),
        ))
    }

    async fn seed(host: &TestHost, document: Value) {
        host.ctx
            .files
            .write_text(&auth_file(host), &document.to_string())
            .await
            .unwrap();
    }

    async fn stored(host: &TestHost) -> Value {
        let text = host.ctx.files.read_text(&auth_file(host)).await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn usage(credential: &Credential) -> HttpRequest {
        HttpRequest::get(USAGE_URL).bearer(credential.bearer().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW + 3_600_000})).await;
        host.http.on(Method::Get, USAGE_URL, 200, "{}");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        let response = session.send(usage).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(host.http.count(TOKEN_URL), 0);
        assert_eq!(
            host.http.requests_to(USAGE_URL)[0].header_value("Authorization"),
            Some("Bearer a1")
        );
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_before_request() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW - 1})).await;
        host.http.on(
            Method::Post,
            TOKEN_URL,
            200,
            r#"{"access_token":"a2","expires_in":3600}"#,
        );
        host.http.on(Method::Get, USAGE_URL, 200, "{}");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        session.send(usage).await.unwrap();

        assert_eq!(host.http.count(TOKEN_URL), 1);
        assert_eq!(
            host.http.requests_to(USAGE_URL)[0].header_value("Authorization"),
            Some("Bearer a2")
        );
        let doc = stored(&host).await;
        assert_eq!(doc["access"], "a2");
        assert_eq!(doc["refresh"], "r1");
        assert_eq!(doc["expires"], NOW + 3_600_000);
    }

    #[tokio::test]
    async fn test_missing_access_token_with_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"refresh": "r1"})).await;
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"access_token":"a2"}"#);
        host.http.on(Method::Get, USAGE_URL, 200, "{}");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        assert_eq!(session.credential().bearer(), Some("a2"));
        session.send(usage).await.unwrap();
        assert_eq!(stored(&host).await["access"], "a2");
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW + 3_600_000})).await;
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"access_token":"a2"}"#);
        host.http.on(Method::Get, USAGE_URL, 401, "");
        host.http.on(Method::Get, USAGE_URL, 200, "{}");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        let response = session.send(usage).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(host.http.count(TOKEN_URL), 1);
        let sent = host.http.requests_to(USAGE_URL);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].header_value("Authorization"), Some("Bearer a2"));
    }

    #[tokio::test]
    async fn test_second_rejection_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW + 3_600_000})).await;
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"access_token":"a2"}"#);
        host.http.on(Method::Get, USAGE_URL, 401, "");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        let err = session.send(usage).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRetryExhausted);
        assert_eq!(host.http.count(TOKEN_URL), 1);
        assert_eq!(host.http.count(USAGE_URL), 2);

        // The budget covers the whole run.
        let err = session.send(usage).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRetryExhausted);
        assert_eq!(host.http.count(TOKEN_URL), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_requires_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW - 1})).await;
        host.http
            .on(Method::Post, TOKEN_URL, 400, r#"{"error":"invalid_grant"}"#);

        let auth = oauth_auth();
        let err = AuthSession::open(&host.ctx, &auth).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReAuthRequired);
        assert_eq!(host.http.count(USAGE_URL), 0);
        assert_eq!(stored(&host).await["access"], "a1");
    }

    #[tokio::test]
    async fn test_soft_refresh_failure_keeps_old_token() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(&host, json!({"access": "a1", "refresh": "r1", "expires": NOW - 1})).await;
        host.http.on(Method::Post, TOKEN_URL, 503, "");
        host.http.on(Method::Get, USAGE_URL, 200, "{}");

        let auth = oauth_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        session.send(usage).await.unwrap();
        assert_eq!(
            host.http.requests_to(USAGE_URL)[0].header_value("Authorization"),
            Some("Bearer a1")
        );
    }

    #[tokio::test]
    async fn test_nothing_stored_is_not_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);

        let auth = oauth_auth();
        let err = AuthSession::open(&host.ctx, &auth).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
        assert_eq!(err.user_message(), "Sign in first.");
        assert!(host.http.requests().is_empty());
    }

    fn keychain_auth() -> ProviderAuth {
        let store = CredentialStore::new(ProviderId::Copilot, Arc::new(Codec))
            .backend(KeychainBackend::owned(ProviderId::Copilot));
        ProviderAuth::new(store, "Sign in first.").device_flow(DeviceFlow::new(
            ProviderId::Copilot,
            DeviceFlowConfig {
                device_code_url: "https://github.com/login/device/code".into(),
                token_url: "https://github.com/login/oauth/access_token".into(),
                client_id: "Iv1.test".into(),
                scope: "read:user".into(),
            },
        ))
    }

    #[tokio::test]
    async fn test_no_policy_second_rejection_invalidates_owned_entry() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.keychain
            .insert("OpenUsage-copilot", "default", r#"{"access":"gho_old"}"#);
        host.http.on(Method::Get, USAGE_URL, 401, "");
        host.http.on(Method::Get, USAGE_URL, 401, "");

        let auth = keychain_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        let err = session.send(usage).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRetryExhausted);
        assert_eq!(host.http.count(USAGE_URL), 2);
        assert!(host.keychain.value("OpenUsage-copilot").is_none());
    }

    #[tokio::test]
    async fn test_no_policy_transient_rejection_retries_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.keychain
            .insert("OpenUsage-copilot", "default", r#"{"access":"gho_ok"}"#);
        host.http.on(Method::Get, USAGE_URL, 401, "");
        host.http.on(Method::Get, USAGE_URL, 200, r#"{"ok":true}"#);

        let auth = keychain_auth();
        let mut session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        let response = session.send(usage).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(host.http.count(USAGE_URL), 2);
        for request in host.http.requests_to(USAGE_URL) {
            assert_eq!(request.header_value("authorization"), Some("Bearer gho_ok"));
        }
        assert!(host.keychain.value("OpenUsage-copilot").unwrap().contains("gho_ok"));
    }

    #[tokio::test]
    async fn test_device_flow_completion_stores_credential() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(
            Method::Post,
            "https://github.com/login/device/code",
            200,
            r#"{"device_code":"dc","user_code":"ABCD-1234","verification_uri":"https://github.com/login/device","expires_in":900,"interval":5}"#,
        );
        host.http.on(
            Method::Post,
            "https://github.com/login/oauth/access_token",
            200,
            r#"{"access_token":"gho_new"}"#,
        );

        let auth = keychain_auth();
        let err = AuthSession::open(&host.ctx, &auth).await.unwrap_err();
        assert_eq!(err.user_message(), "Visit https://github.com/login/device and enter code ABCD-1234");

        let session = AuthSession::open(&host.ctx, &auth).await.unwrap();
        assert_eq!(session.credential().bearer(), Some("gho_new"));
        assert_eq!(session.credential().source, CredentialSource::DeviceFlow);
        assert!(host.keychain.value("OpenUsage-copilot").unwrap().contains("gho_new"));
    }
}
