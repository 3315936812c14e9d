//! Codex provider descriptor.

use std::sync::Arc;

use openusage_core::ProviderId;
use openusage_fetch::UsageProbe;

use super::probe::CodexUsageProbe;
use crate::descriptor::{ProviderDescriptor, ProviderMetadata};

/// Creates the Codex provider descriptor.
pub fn codex_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderId::Codex,
        metadata: ProviderMetadata {
            display_name: "Codex",
            primary_label: "Session",
            dashboard_url: Some("https://chatgpt.com/codex/settings/usage"),
            default_enabled: true,
        },
        allowed_hosts: &["chatgpt.com", "openai.com"],
        build_probe,
        device_flow: None,
    }
}

fn build_probe() -> Arc<dyn UsageProbe> {
    Arc::new(CodexUsageProbe::new())
}
