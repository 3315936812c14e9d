//! Cursor provider descriptor.

use std::sync::Arc;

use openusage_core::ProviderId;
use openusage_fetch::UsageProbe;

use super::probe::CursorUsageProbe;
use crate::descriptor::{ProviderDescriptor, ProviderMetadata};

/// Creates the Cursor provider descriptor.
pub fn cursor_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderId::Cursor,
        metadata: ProviderMetadata {
            display_name: "Cursor",
            primary_label: "Plan usage",
            dashboard_url: Some("https://cursor.com/dashboard"),
            default_enabled: true,
        },
        allowed_hosts: &["cursor.sh"],
        build_probe,
        device_flow: None,
    }
}

fn build_probe() -> Arc<dyn UsageProbe> {
    Arc::new(CursorUsageProbe::new())
}
