//! Copilot provider descriptor.

use std::sync::Arc;

use openusage_core::ProviderId;
use openusage_fetch::UsageProbe;

use super::credentials::github_device_flow;
use super::probe::CopilotUsageProbe;
use crate::descriptor::{ProviderDescriptor, ProviderMetadata};

/// Creates the Copilot provider descriptor.
pub fn copilot_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderId::Copilot,
        metadata: ProviderMetadata {
            display_name: "Copilot",
            primary_label: "Premium",
            dashboard_url: Some("https://github.com/settings/copilot"),
            default_enabled: true,
        },
        allowed_hosts: &["github.com"],
        build_probe,
        device_flow: Some(github_device_flow),
    }
}

fn build_probe() -> Arc<dyn UsageProbe> {
    Arc::new(CopilotUsageProbe::new())
}
