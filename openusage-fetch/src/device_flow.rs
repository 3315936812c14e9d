//! OAuth 2.0 Device Authorization Grant (RFC 8628), one step per probe.
//!
//! Probes never block waiting for the user. Each probe attempt advances the
//! flow by at most one network call:
//!
//! 1. **No flow**: request a device code, persist it, surface the
//!    "visit URL and enter code" instruction.
//! 2. **Pending**: check the local expiry first, then poll the token
//!    endpoint once (unless the previous poll was less than one interval ago).
//! 3. **Expired / Invalid**: forget the flow and surface an error; the next
//!    attempt starts over.
//! 4. **Authorized**: forget the flow and hand the token to the caller.
//!
//! Only the pending state is persisted, one JSON document per provider.

use std::path::PathBuf;

use openusage_core::ProviderId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::classify::{ProbeError, ensure_success};
use crate::context::ProbeContext;
use crate::host::HttpRequest;
use crate::token::TokenGrant;

/// Grant type for device-code polling.
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Seconds added to the interval on `slow_down`.
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// State file inside the provider's data directory.
const STATE_FILE: &str = "device_flow.json";

// ============================================================================
// Types
// ============================================================================

/// Endpoints and client of a device authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFlowConfig {
    /// Device code endpoint.
    pub device_code_url: String,
    /// Token endpoint polled for completion.
    pub token_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// Requested scope.
    pub scope: String,
}

/// A device code waiting for the user. This is what gets persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Secret device code used when polling.
    pub device_code: String,
    /// Code the user enters.
    pub user_code: String,
    /// Where the user enters it.
    pub verification_uri: String,
    /// When the device code stops being valid.
    pub expires_at_ms: i64,
    /// Minimum seconds between polls.
    pub interval_secs: u64,
    /// When the token endpoint was last polled.
    #[serde(default)]
    pub last_poll_at_ms: Option<i64>,
}

impl PendingAuthorization {
    /// Instruction error shown while waiting.
    pub fn instruction(&self) -> ProbeError {
        ProbeError::DeviceFlowPending {
            verification_uri: self.verification_uri.clone(),
            user_code: self.user_code.clone(),
        }
    }

    /// Whether the device code is past its lifetime. The expiry instant
    /// itself is still valid.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms
    }

    /// Whether one interval has passed since the last poll.
    pub fn may_poll(&self, now_ms: i64) -> bool {
        let interval_ms = i64::try_from(self.interval_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.last_poll_at_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= interval_ms)
    }
}

/// Device flow state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// Nothing in progress.
    NoFlow,
    /// Waiting for the user.
    Pending(PendingAuthorization),
    /// The device code expired.
    Expired,
    /// The server refused the authorization.
    Invalid(String),
    /// The user approved; tokens issued.
    Authorized(TokenGrant),
}

/// Token endpoint answer to one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// `authorization_pending`
    Pending,
    /// `slow_down`, optionally with the server's new interval.
    SlowDown(Option<u64>),
    /// `expired_token`
    Expired,
    /// Any other error code.
    Denied(String),
    /// Tokens issued.
    Authorized(TokenGrant),
}

impl PollResponse {
    /// Interprets a token endpoint response body.
    pub fn parse(body: &Value, now_ms: i64) -> Result<Self, ProbeError> {
        if let Some(token) = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            #[allow(clippy::cast_possible_truncation)]
            let expires_at_ms = body
                .get("expires_in")
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite() && *s > 0.0)
                .map(|s| now_ms + (s * 1000.0) as i64);
            return Ok(Self::Authorized(TokenGrant {
                access_token: token.to_string(),
                refresh_token: body
                    .get("refresh_token")
                    .and_then(Value::as_str)
                    .map(String::from),
                id_token: None,
                expires_at_ms,
            }));
        }

        match body.get("error").and_then(Value::as_str) {
            Some("authorization_pending") => Ok(Self::Pending),
            Some("slow_down") => Ok(Self::SlowDown(
                body.get("interval").and_then(Value::as_u64),
            )),
            Some("expired_token") => Ok(Self::Expired),
            Some(code) => Ok(Self::Denied(code.to_string())),
            None => Err(ProbeError::Malformed(
                "device token response has neither token nor error".into(),
            )),
        }
    }
}

impl DeviceFlowState {
    /// Transition of a pending flow after one poll.
    pub fn after_poll(mut pending: PendingAuthorization, response: PollResponse) -> Self {
        match response {
            PollResponse::Pending => Self::Pending(pending),
            PollResponse::SlowDown(server_interval) => {
                pending.interval_secs = server_interval
                    .unwrap_or(pending.interval_secs + SLOW_DOWN_STEP_SECS)
                    .max(pending.interval_secs + SLOW_DOWN_STEP_SECS);
                Self::Pending(pending)
            }
            PollResponse::Expired => Self::Expired,
            PollResponse::Denied(code) => Self::Invalid(code),
            PollResponse::Authorized(grant) => Self::Authorized(grant),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
}

fn default_interval() -> u64 {
    5
}

// ============================================================================
// Device Flow
// ============================================================================

/// Device flow driver for one provider.
#[derive(Debug, Clone)]
pub struct DeviceFlow {
    provider: ProviderId,
    config: DeviceFlowConfig,
}

impl DeviceFlow {
    /// Creates a driver.
    pub fn new(provider: ProviderId, config: DeviceFlowConfig) -> Self {
        Self { provider, config }
    }

    /// Server configuration.
    pub fn config(&self) -> &DeviceFlowConfig {
        &self.config
    }

    fn state_path(&self, ctx: &ProbeContext) -> PathBuf {
        ctx.provider_data_dir(self.provider).join(STATE_FILE)
    }

    /// Reads the persisted state.
    pub async fn load(&self, ctx: &ProbeContext) -> DeviceFlowState {
        let path = self.state_path(ctx);
        match ctx.files.read_text(&path).await {
            Ok(Some(text)) => match serde_json::from_str::<PendingAuthorization>(&text) {
                Ok(pending) => DeviceFlowState::Pending(pending),
                Err(e) => {
                    warn!(provider = %self.provider, error = %e, "Discarding unreadable device flow state");
                    DeviceFlowState::NoFlow
                }
            },
            Ok(None) => DeviceFlowState::NoFlow,
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "Failed to read device flow state");
                DeviceFlowState::NoFlow
            }
        }
    }

    async fn save(&self, ctx: &ProbeContext, pending: &PendingAuthorization) {
        let path = self.state_path(ctx);
        let result = match serde_json::to_string_pretty(pending) {
            Ok(text) => ctx.files.write_text(&path, &text).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            warn!(provider = %self.provider, error = %e, "Failed to save device flow state");
        }
    }

    /// Forgets any flow in progress.
    pub async fn cancel(&self, ctx: &ProbeContext) {
        if let Err(e) = ctx.files.remove(&self.state_path(ctx)).await {
            warn!(provider = %self.provider, error = %e, "Failed to clear device flow state");
        }
    }

    /// Advances the flow by one step.
    ///
    /// Returns the issued tokens once the user has approved; every other
    /// state is reported as an error carrying the message to show.
    #[instrument(skip(self, ctx), fields(provider = %self.provider))]
    pub async fn step(&self, ctx: &ProbeContext) -> Result<TokenGrant, ProbeError> {
        let mut pending = match self.load(ctx).await {
            DeviceFlowState::Pending(pending) => pending,
            _ => {
                let pending = self.start(ctx).await?;
                self.save(ctx, &pending).await;
                return Err(pending.instruction());
            }
        };

        let now = ctx.now_ms();
        if pending.is_expired(now) {
            debug!("Device code expired locally");
            self.cancel(ctx).await;
            return Err(ProbeError::DeviceFlowExpired);
        }
        if !pending.may_poll(now) {
            debug!("Poll interval not yet elapsed");
            return Err(pending.instruction());
        }

        pending.last_poll_at_ms = Some(now);
        let response = match self.poll(ctx, &pending).await {
            Ok(response) => response,
            Err(e) => {
                self.save(ctx, &pending).await;
                return Err(e);
            }
        };

        match DeviceFlowState::after_poll(pending, response) {
            DeviceFlowState::Pending(pending) => {
                self.save(ctx, &pending).await;
                Err(pending.instruction())
            }
            DeviceFlowState::Expired => {
                self.cancel(ctx).await;
                Err(ProbeError::DeviceFlowExpired)
            }
            DeviceFlowState::Invalid(code) => {
                warn!(code = %code, "Device authorization refused");
                self.cancel(ctx).await;
                Err(ProbeError::DeviceFlowFailed(code))
            }
            DeviceFlowState::Authorized(grant) => {
                info!("Device authorization completed");
                self.cancel(ctx).await;
                Ok(grant)
            }
            DeviceFlowState::NoFlow => Err(ProbeError::NotAuthenticated(String::new())),
        }
    }

    async fn start(&self, ctx: &ProbeContext) -> Result<PendingAuthorization, ProbeError> {
        let request = HttpRequest::post(&self.config.device_code_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ]);
        let response = ensure_success(ctx.http.send(request).await?)?;
        let start: DeviceCodeResponse = response.json()?;

        let expires_in_ms = i64::try_from(start.expires_in.saturating_mul(1000)).unwrap_or(i64::MAX);
        debug!(expires_in = start.expires_in, interval = start.interval, "Device flow started");
        Ok(PendingAuthorization {
            device_code: start.device_code,
            user_code: start.user_code,
            verification_uri: start.verification_uri,
            expires_at_ms: ctx.now_ms().saturating_add(expires_in_ms),
            interval_secs: start.interval.max(1),
            last_poll_at_ms: None,
        })
    }

    async fn poll(
        &self,
        ctx: &ProbeContext,
        pending: &PendingAuthorization,
    ) -> Result<PollResponse, ProbeError> {
        let request = HttpRequest::post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("device_code", pending.device_code.as_str()),
                ("grant_type", DEVICE_GRANT_TYPE),
            ]);
        let response = ctx.http.send(request).await?;
        // RFC 8628 servers answer pending polls with 400; GitHub uses 200.
        if !response.is_success() && response.status != 400 {
            return Err(ProbeError::from_status(&response));
        }
        PollResponse::parse(&response.json()?, ctx.now_ms())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Method;
    use crate::testing::TestHost;
    use openusage_core::ErrorKind;
    use serde_json::json;

    const CODE_URL: &str = "https://github.com/login/device/code";
    const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
    const NOW: i64 = 1_700_000_000_000;

    fn flow() -> DeviceFlow {
        DeviceFlow::new(
            ProviderId::Copilot,
            DeviceFlowConfig {
                device_code_url: CODE_URL.into(),
                token_url: TOKEN_URL.into(),
                client_id: "Iv1.test".into(),
                scope: "read:user".into(),
            },
        )
    }

    fn start_response() -> &'static str {
        r#"{"device_code":"dc","user_code":"WDJB-MJHT","verification_uri":"https://github.com/login/device","expires_in":900,"interval":5}"#
    }

    #[tokio::test]
    async fn test_no_flow_starts_and_surfaces_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());

        let err = flow().step(&host.ctx).await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Visit https://github.com/login/device and enter code WDJB-MJHT"
        );
        assert_eq!(host.http.count(TOKEN_URL), 0);

        match flow().load(&host.ctx).await {
            DeviceFlowState::Pending(p) => {
                assert_eq!(p.device_code, "dc");
                assert_eq!(p.expires_at_ms, NOW + 900_000);
            }
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pending_polls_yield_same_message() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"error":"authorization_pending"}"#);

        let first = flow().step(&host.ctx).await.unwrap_err().user_message();
        for _ in 0..3 {
            host.clock.advance(5_000);
            let again = flow().step(&host.ctx).await.unwrap_err();
            assert_eq!(again.user_message(), first);
        }
        assert_eq!(host.http.count(TOKEN_URL), 3);
        assert_eq!(host.http.count(CODE_URL), 1);

        let poll = &host.http.requests_to(TOKEN_URL)[0];
        let body = poll.body.as_deref().unwrap();
        assert!(body.contains("device_code=dc"));
        assert!(body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
    }

    #[tokio::test]
    async fn test_poll_skipped_inside_interval() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"error":"authorization_pending"}"#);

        flow().step(&host.ctx).await.unwrap_err();
        flow().step(&host.ctx).await.unwrap_err();
        host.clock.advance(1_000);
        flow().step(&host.ctx).await.unwrap_err();
        assert_eq!(host.http.count(TOKEN_URL), 1);
    }

    #[tokio::test]
    async fn test_locally_expired_makes_no_http_calls() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let pending = PendingAuthorization {
            device_code: "dc".into(),
            user_code: "ABCD".into(),
            verification_uri: "https://github.com/login/device".into(),
            expires_at_ms: NOW - 1,
            interval_secs: 5,
            last_poll_at_ms: None,
        };
        flow().save(&host.ctx, &pending).await;

        let err = flow().step(&host.ctx).await.unwrap_err();
        assert!(matches!(err, ProbeError::DeviceFlowExpired));
        assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
        assert!(host.http.requests().is_empty());
        assert_eq!(flow().load(&host.ctx).await, DeviceFlowState::NoFlow);
    }

    #[tokio::test]
    async fn test_polls_at_exact_expiry_instant() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"error":"authorization_pending"}"#);
        let pending = PendingAuthorization {
            device_code: "dc".into(),
            user_code: "ABCD".into(),
            verification_uri: "https://github.com/login/device".into(),
            expires_at_ms: NOW,
            interval_secs: 5,
            last_poll_at_ms: None,
        };
        assert!(!pending.is_expired(NOW));
        assert!(pending.is_expired(NOW + 1));
        flow().save(&host.ctx, &pending).await;

        let err = flow().step(&host.ctx).await.unwrap_err();
        assert!(!matches!(err, ProbeError::DeviceFlowExpired));
        assert_eq!(host.http.count(TOKEN_URL), 1);
        assert!(matches!(flow().load(&host.ctx).await, DeviceFlowState::Pending(_)));
    }

    #[tokio::test]
    async fn test_slow_down_raises_interval() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http.on(Method::Post, TOKEN_URL, 200, r#"{"error":"slow_down"}"#);

        flow().step(&host.ctx).await.unwrap_err();
        flow().step(&host.ctx).await.unwrap_err();
        match flow().load(&host.ctx).await {
            DeviceFlowState::Pending(p) => {
                assert_eq!(p.interval_secs, 10);
                assert_eq!(p.last_poll_at_ms, Some(NOW));
            }
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_and_denied_clear_state() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http.on(Method::Post, TOKEN_URL, 200, r#"{"error":"expired_token"}"#);

        flow().step(&host.ctx).await.unwrap_err();
        let err = flow().step(&host.ctx).await.unwrap_err();
        assert!(matches!(err, ProbeError::DeviceFlowExpired));
        assert_eq!(flow().load(&host.ctx).await, DeviceFlowState::NoFlow);

        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http.on(Method::Post, TOKEN_URL, 200, r#"{"error":"access_denied"}"#);

        flow().step(&host.ctx).await.unwrap_err();
        let err = flow().step(&host.ctx).await.unwrap_err();
        assert!(matches!(err, ProbeError::DeviceFlowFailed(ref c) if c == "access_denied"));
        assert_ne!(err.user_message(), ProbeError::DeviceFlowExpired.user_message());
        assert_eq!(flow().load(&host.ctx).await, DeviceFlowState::NoFlow);
    }

    #[tokio::test]
    async fn test_authorized_returns_grant() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        host.http.on(Method::Post, CODE_URL, 200, start_response());
        host.http.on(
            Method::Post,
            TOKEN_URL,
            200,
            r#"{"access_token":"gho_new","token_type":"bearer","scope":"read:user"}"#,
        );

        flow().step(&host.ctx).await.unwrap_err();
        let grant = flow().step(&host.ctx).await.unwrap();
        assert_eq!(grant.access_token, "gho_new");
        assert_eq!(flow().load(&host.ctx).await, DeviceFlowState::NoFlow);
    }

    #[test]
    fn test_transitions() {
        let pending = PendingAuthorization {
            device_code: "dc".into(),
            user_code: "u".into(),
            verification_uri: "v".into(),
            expires_at_ms: NOW,
            interval_secs: 5,
            last_poll_at_ms: None,
        };
        assert_eq!(
            DeviceFlowState::after_poll(pending.clone(), PollResponse::SlowDown(Some(20))),
            DeviceFlowState::Pending(PendingAuthorization {
                interval_secs: 20,
                ..pending.clone()
            })
        );
        assert_eq!(
            DeviceFlowState::after_poll(pending.clone(), PollResponse::Denied("x".into())),
            DeviceFlowState::Invalid("x".into())
        );
        assert_eq!(
            DeviceFlowState::after_poll(pending, PollResponse::Expired),
            DeviceFlowState::Expired
        );
    }

    #[test]
    fn test_parse_poll_response() {
        assert_eq!(
            PollResponse::parse(&json!({"error": "authorization_pending"}), NOW).unwrap(),
            PollResponse::Pending
        );
        assert!(PollResponse::parse(&json!({"weird": 1}), NOW).is_err());
        match PollResponse::parse(&json!({"access_token": "t", "expires_in": 60}), NOW).unwrap() {
            PollResponse::Authorized(grant) => assert_eq!(grant.expires_at_ms, Some(NOW + 60_000)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
