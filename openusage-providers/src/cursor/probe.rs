//! Cursor usage probe.

use async_trait::async_trait;
use openusage_core::{ProbeOutput, ProviderId};
use openusage_fetch::{AuthSession, ProbeContext, ProbeError, ProviderAuth, UsageProbe, ensure_success};
use tracing::instrument;

use super::api::usage_request;
use super::credentials::cursor_auth;
use super::parser::parse_usage;

/// Fetches Cursor usage with the editor's session token.
#[derive(Debug)]
pub struct CursorUsageProbe {
    auth: ProviderAuth,
}

impl CursorUsageProbe {
    /// Creates a probe reading the editor's state database.
    pub fn new() -> Self {
        Self { auth: cursor_auth() }
    }
}

impl Default for CursorUsageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageProbe for CursorUsageProbe {
    fn provider(&self) -> ProviderId {
        ProviderId::Cursor
    }

    #[instrument(skip_all, fields(provider = "cursor"))]
    async fn probe(&self, ctx: &ProbeContext) -> Result<ProbeOutput, ProbeError> {
        let mut session = AuthSession::open(ctx, &self.auth).await?;
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
    use crate::cursor::api::USAGE_URL;
    use crate::cursor::credentials::{TOKEN_URL, state_db_path};
    use openusage_core::ErrorKind;
    use openusage_fetch::Method;
    use openusage_fetch::testing::{TestHost, create_item_db, make_token};
    use serde_json::json;
    use std::path::{Path, PathBuf};

    const NOW: i64 = 1_700_000_000_000;
    const USAGE: &str = r#"{"billingCycleEnd":"1701000000000","planUsage":{"includedSpend":500,"limit":2000}}"#;

    fn db_path(dir: &Path) -> PathBuf {
        dir.join("home")
            .join(state_db_path().trim_start_matches("~/"))
    }

    fn token(exp_secs: i64) -> String {
        make_token(&json!({"sub": "user", "exp": exp_secs}))
    }

    #[tokio::test]
    async fn test_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let access = token(NOW / 1000 + 3600);
        create_item_db(
            &db_path(dir.path()),
            &[
                ("cursorAuth/accessToken", access.as_str()),
                ("cursorAuth/refreshToken", "r1"),
                ("cursorAuth/stripeMembershipType", "pro"),
            ],
        );
        host.http.on(Method::Post, USAGE_URL, 200, USAGE);

        let output = CursorUsageProbe::new().probe(&host.ctx).await.unwrap();
        assert_eq!(output.plan.as_deref(), Some("Pro"));
        assert_eq!(output.lines[0].label(), "Plan usage");

        let sent = &host.http.requests_to(USAGE_URL)[0];
        assert_eq!(
            sent.header_value("authorization"),
            Some(format!("Bearer {access}").as_str())
        );
        assert_eq!(sent.header_value("connect-protocol-version"), Some("1"));
        assert_eq!(host.http.count(TOKEN_URL), 0);
    }

    #[tokio::test]
    async fn test_expired_jwt_is_refreshed_into_database() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let expired = token(NOW / 1000 - 60);
        let fresh = token(NOW / 1000 + 3600);
        create_item_db(
            &db_path(dir.path()),
            &[
                ("cursorAuth/accessToken", expired.as_str()),
                ("cursorAuth/refreshToken", "r1"),
            ],
        );
        host.http.on(
            Method::Post,
            TOKEN_URL,
            200,
            &json!({"access_token": fresh, "shouldLogout": false}).to_string(),
        );
        host.http.on(Method::Post, USAGE_URL, 200, USAGE);

        CursorUsageProbe::new().probe(&host.ctx).await.unwrap();
        assert_eq!(host.http.count(TOKEN_URL), 1);

        let stored = host
            .ctx
            .sqlite
            .get_item(&db_path(dir.path()), "cursorAuth/accessToken")
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some(fresh.as_str()));
        let refresh = host
            .ctx
            .sqlite
            .get_item(&db_path(dir.path()), "cursorAuth/refreshToken")
            .await
            .unwrap();
        assert_eq!(refresh.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_server_logout_requires_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let expired = token(NOW / 1000 - 60);
        create_item_db(
            &db_path(dir.path()),
            &[
                ("cursorAuth/accessToken", expired.as_str()),
                ("cursorAuth/refreshToken", "r1"),
            ],
        );
        host.http
            .on(Method::Post, TOKEN_URL, 200, r#"{"shouldLogout":true}"#);

        let err = CursorUsageProbe::new().probe(&host.ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReAuthRequired);
        assert_eq!(host.http.count(USAGE_URL), 0);
    }

    #[tokio::test]
    async fn test_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let err = CursorUsageProbe::new().probe(&host.ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
    }
}
