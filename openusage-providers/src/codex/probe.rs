//! Codex usage probe.

use async_trait::async_trait;
use openusage_core::{ErrorKind, ProbeOutput, ProviderId};
use openusage_fetch::{
    AuthSession, CredentialBackend, ProbeContext, ProbeError, ProviderAuth, UsageProbe,
    ensure_success,
};
use tracing::{debug, instrument};

use super::api::usage_request;
use super::credentials::{auth_file_backend, codex_auth, is_api_key_only};
use super::parser::parse_usage;

/// Fetches Codex usage with the CLI's ChatGPT sign-in.
#[derive(Debug)]
pub struct CodexUsageProbe {
    auth: ProviderAuth,
}

impl CodexUsageProbe {
    /// Creates a probe with the standard credential chain.
    pub fn new() -> Self {
        Self { auth: codex_auth() }
    }

    /// Tells an API-key sign-in apart from no sign-in at all.
    async fn explain_missing(ctx: &ProbeContext, err: ProbeError) -> ProbeError {
        if err.kind() != ErrorKind::NotAuthenticated {
            return err;
        }
        match auth_file_backend().load(ctx).await {
            Ok(Some(document)) if is_api_key_only(&document) => {
                debug!("Codex is signed in with an API key");
                ProbeError::FeatureUnavailable(
                    "Usage is only available when Codex is signed in with ChatGPT.".into(),
                )
            }
            _ => err,
        }
    }
}

impl Default for CodexUsageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageProbe for CodexUsageProbe {
    fn provider(&self) -> ProviderId {
        ProviderId::Codex
    }

    #[instrument(skip_all, fields(provider = "codex"))]
    async fn probe(&self, ctx: &ProbeContext) -> Result<ProbeOutput, ProbeError> {
        let mut session = match AuthSession::open(ctx, &self.auth).await {
            Ok(session) => session,
            Err(e) => return Err(Self::explain_missing(ctx, e).await),
        };
        let response = ensure_success(session.send(usage_request).await?)?;
        parse_usage(&response.body, ctx.now_ms())
    }
}
