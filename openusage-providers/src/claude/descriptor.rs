//! Claude provider descriptor.

use std::sync::Arc;

use openusage_core::ProviderId;
use openusage_fetch::UsageProbe;

use super::probe::ClaudeUsageProbe;
use crate::descriptor::{ProviderDescriptor, ProviderMetadata};

/// Creates the Claude provider descriptor.
pub fn claude_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderId::Claude,
        metadata: ProviderMetadata {
            display_name: "Claude",
            primary_label: "Session",
            dashboard_url: Some("https://claude.ai/settings/usage"),
            default_enabled: true,
        },
        allowed_hosts: &["anthropic.com"],
        build_probe,
        device_flow: None,
    }
}

fn build_probe() -> Arc<dyn UsageProbe> {
    Arc::new(ClaudeUsageProbe::new())
}
