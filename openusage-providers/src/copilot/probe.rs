//! Copilot usage probe.

use async_trait::async_trait;
use openusage_core::{ProbeOutput, ProviderId};
use openusage_fetch::{AuthSession, ProbeContext, ProbeError, ProviderAuth, UsageProbe, ensure_success};
use tracing::instrument;

use super::api::usage_request;
use super::credentials::copilot_auth;
use super::parser::parse_usage;

/// Fetches Copilot quotas with a GitHub token.
#[derive(Debug)]
pub struct CopilotUsageProbe {
    auth: ProviderAuth,
}

impl CopilotUsageProbe {
    /// Creates a probe with the standard credential chain.
    pub fn new() -> Self {
        Self {
            auth: copilot_auth(),
        }
    }

    /// Credential chain and device flow, for `login`.
    pub fn auth(&self) -> &ProviderAuth {
        &self.auth
    }
}

impl Default for CopilotUsageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageProbe for CopilotUsageProbe {
    fn provider(&self) -> ProviderId {
        ProviderId::Copilot
    }

    #[instrument(skip_all, fields(provider = "copilot"))]
    async fn probe(&self, ctx: &ProbeContext) -> Result<ProbeOutput, ProbeError> {
        let mut session = AuthSession::open(ctx, &self.auth).await?;
        let response = ensure_success(session.send(usage_request).await?)?;
        parse_usage(&response.body)
    }
}
