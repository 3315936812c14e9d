//! Provider descriptor system.
//!
//! A descriptor contains all the static configuration for a provider:
//! - Metadata (display name, labels, URLs)
//! - Hosts its probe is allowed to contact
//! - A factory for its usage probe
//! - The device flow used by `login`, for providers that support one

use std::sync::Arc;

use openusage_core::ProviderId;
use openusage_fetch::{DeviceFlow, UsageProbe};

// ============================================================================
// Provider Descriptor
// ============================================================================

/// Complete descriptor for a provider.
pub struct ProviderDescriptor {
    /// Provider identifier.
    pub id: ProviderId,
    /// Display metadata.
    pub metadata: ProviderMetadata,
    /// Domains the probe talks to (subdomains included).
    pub allowed_hosts: &'static [&'static str],
    /// Creates the provider's usage probe.
    pub build_probe: fn() -> Arc<dyn UsageProbe>,
    /// Creates the provider's device flow, if it can sign in by itself.
    pub device_flow: Option<fn() -> DeviceFlow>,
}

impl ProviderDescriptor {
    /// Returns the display name.
    pub fn display_name(&self) -> &'static str {
        self.metadata.display_name
    }

    /// Returns the CLI name.
    pub fn cli_name(&self) -> &'static str {
        self.id.cli_name()
    }

    /// Creates the usage probe.
    pub fn probe(&self) -> Arc<dyn UsageProbe> {
        (self.build_probe)()
    }

    /// Creates the device flow, if supported.
    pub fn device_flow(&self) -> Option<DeviceFlow> {
        self.device_flow.map(|build| build())
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("allowed_hosts", &self.allowed_hosts)
            .field("device_flow", &self.device_flow.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Human-readable name.
    pub display_name: &'static str,
    /// Label of the progress line shown in compact views.
    pub primary_label: &'static str,
    /// Where users can see their usage in a browser.
    pub dashboard_url: Option<&'static str>,
    /// Whether the provider is probed without explicit opt-in.
    pub default_enabled: bool,
}
