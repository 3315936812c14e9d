//! Claude usage probe.

use async_trait::async_trait;
use openusage_core::{ProbeOutput, ProviderId};
use openusage_fetch::{AuthSession, ProbeContext, ProbeError, ProviderAuth, UsageProbe, ensure_success};
use tracing::{debug, instrument};

use super::api::usage_request;
use super::credentials::{claude_auth, has_profile_scope};
use super::parser::parse_usage;

/// Fetches Claude usage with the CLI's OAuth token.
#[derive(Debug)]
pub struct ClaudeUsageProbe {
    auth: ProviderAuth,
}

impl ClaudeUsageProbe {
    /// Creates a probe with the standard credential chain.
    pub fn new() -> Self {
        Self { auth: claude_auth() }
    }
}

impl Default for ClaudeUsageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageProbe for ClaudeUsageProbe {
    fn provider(&self) -> ProviderId {
        ProviderId::Claude
    }

    #[instrument(skip_all, fields(provider = "claude"))]
    async fn probe(&self, ctx: &ProbeContext) -> Result<ProbeOutput, ProbeError> {
        let mut session = AuthSession::open(ctx, &self.auth).await?;
        if !has_profile_scope(session.credential()) {
            debug!("Token lacks the profile scope");
            return Err(ProbeError::FeatureUnavailable(
                "Usage requires a newer Claude sign-in. Run `claude` and log in again.".into(),
            ));
        }

        let response = ensure_success(session.send(usage_request).await?)?;
        parse_usage(
            &response.body,
            session.credential().subscription_type.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claude::api::USAGE_URL;
    use crate::claude::credentials::{KEYCHAIN_SERVICE, TOKEN_URL};
    use openusage_core::ErrorKind;
    use openusage_fetch::Method;
    use openusage_fetch::host::keychain::current_user;
    use openusage_fetch::testing::TestHost;
    use serde_json::{Value, json};
    use std::path::PathBuf;

    const NOW: i64 = 1_700_000_000_000;
    const USAGE: &str = r#"{"five_hour":{"utilization":12.0,"resets_at":"2023-11-14T23:00:00Z"},"seven_day":{"utilization":40.0}}"#;

    fn credentials_path(dir: &std::path::Path) -> PathBuf {
        dir.join("home/.claude/.credentials.json")
    }

    async fn seed(host: &TestHost, dir: &std::path::Path, oauth: Value) {
        host.ctx
            .files
            .write_text(&credentials_path(dir), &json!({"claudeAiOauth": oauth}).to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(
            &host,
            dir.path(),
            json!({"accessToken": "a1", "refreshToken": "r1", "expiresAt": NOW + 3_600_000, "subscriptionType": "pro"}),
        )
        .await;
        host.http.on(Method::Get, USAGE_URL, 200, USAGE);

        let output = ClaudeUsageProbe::new().probe(&host.ctx).await.unwrap();
        assert_eq!(output.plan.as_deref(), Some("Pro"));
        assert_eq!(output.lines.len(), 2);

        let sent = &host.http.requests_to(USAGE_URL)[0];
        assert_eq!(sent.header_value("authorization"), Some("Bearer a1"));
        assert_eq!(sent.header_value("anthropic-beta"), Some("oauth-2025-04-20"));
        assert_eq!(host.http.count(TOKEN_URL), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(
            &host,
            dir.path(),
            json!({"accessToken": "a1", "refreshToken": "r1", "expiresAt": NOW - 1, "scopes": ["user:profile"]}),
        )
        .await;
        host.http.on(
            Method::Post,
            TOKEN_URL,
            200,
            r#"{"access_token":"a2","refresh_token":"r2","expires_in":28800}"#,
        );
        host.http.on(Method::Get, USAGE_URL, 200, USAGE);

        ClaudeUsageProbe::new().probe(&host.ctx).await.unwrap();
        assert_eq!(host.http.count(TOKEN_URL), 1);

        let text = host
            .ctx
            .files
            .read_text(&credentials_path(dir.path()))
            .await
            .unwrap()
            .unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["claudeAiOauth"]["accessToken"], "a2");
        assert_eq!(doc["claudeAiOauth"]["refreshToken"], "r2");
        assert_eq!(doc["claudeAiOauth"]["expiresAt"], NOW + 28_800_000);
        assert_eq!(doc["claudeAiOauth"]["scopes"][0], "user:profile");
    }

    #[tokio::test]
    async fn test_missing_profile_scope() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        seed(
            &host,
            dir.path(),
            json!({"accessToken": "a1", "expiresAt": NOW + 3_600_000, "scopes": ["user:inference"]}),
        )
        .await;

        let err = ClaudeUsageProbe::new().probe(&host.ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureUnavailable);
        assert_eq!(host.http.count(USAGE_URL), 0);
    }

    #[tokio::test]
    async fn test_hex_encoded_keychain_entry() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let json = json!({"claudeAiOauth": {"accessToken": "from-keychain", "expiresAt": NOW + 3_600_000}});
        let hex: String = json
            .to_string()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect();
        host.keychain.insert(KEYCHAIN_SERVICE, &current_user(), &hex);
        host.http.on(Method::Get, USAGE_URL, 200, USAGE);

        ClaudeUsageProbe::new().probe(&host.ctx).await.unwrap();
        assert_eq!(
            host.http.requests_to(USAGE_URL)[0].header_value("authorization"),
            Some("Bearer from-keychain")
        );
        assert!(!credentials_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_not_signed_in() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let err = ClaudeUsageProbe::new().probe(&host.ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
        assert!(err.user_message().contains("claude"));
    }
}
