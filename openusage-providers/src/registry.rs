//! Provider registry for managing all provider descriptors.
//!
//! The registry provides static access to all provider configurations
//! and is the central point for looking up providers and their probes.

use std::sync::{Arc, OnceLock};

use openusage_core::ProviderId;
use openusage_fetch::{ProbeCatalog, UsageProbe};

use crate::claude::claude_descriptor;
use crate::codex::codex_descriptor;
use crate::copilot::copilot_descriptor;
use crate::cursor::cursor_descriptor;
use crate::descriptor::ProviderDescriptor;

// ============================================================================
// Static Registry
// ============================================================================

/// Static storage for all provider descriptors.
static DESCRIPTORS: OnceLock<Vec<ProviderDescriptor>> = OnceLock::new();

/// Initializes all provider descriptors in display order.
fn init_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        claude_descriptor(),
        codex_descriptor(),
        copilot_descriptor(),
        cursor_descriptor(),
    ]
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Global registry of all provider descriptors.
///
/// The registry is initialized lazily on first access and provides
/// thread-safe access to provider configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Returns all provider descriptors.
    pub fn all() -> &'static [ProviderDescriptor] {
        DESCRIPTORS.get_or_init(init_descriptors)
    }

    /// Gets a provider descriptor by id.
    pub fn get(id: ProviderId) -> Option<&'static ProviderDescriptor> {
        Self::all().iter().find(|d| d.id == id)
    }

    /// Looks up a provider by CLI name (case-insensitive).
    pub fn get_by_cli_name(name: &str) -> Option<&'static ProviderDescriptor> {
        let id = name.parse::<ProviderId>().ok()?;
        Self::get(id)
    }

    /// Returns all enabled-by-default providers.
    pub fn default_enabled() -> Vec<ProviderId> {
        Self::all()
            .iter()
            .filter(|d| d.metadata.default_enabled)
            .map(|d| d.id)
            .collect()
    }

    /// Returns all provider ids in display order.
    pub fn ids() -> Vec<ProviderId> {
        Self::all().iter().map(|d| d.id).collect()
    }

    /// Union of every provider's allowed hosts, for the shared HTTP client.
    pub fn allowed_hosts() -> Vec<String> {
        let mut hosts: Vec<String> = Self::all()
            .iter()
            .flat_map(|d| d.allowed_hosts.iter().map(|h| (*h).to_string()))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Returns the number of registered providers.
    pub fn count() -> usize {
        Self::all().len()
    }
}

impl ProbeCatalog for ProviderRegistry {
    fn probe(&self, id: ProviderId) -> Option<Arc<dyn UsageProbe>> {
        Self::get(id).map(ProviderDescriptor::probe)
    }

    fn ids(&self) -> Vec<ProviderId> {
        Self::ids()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_every_provider() {
        assert_eq!(ProviderRegistry::count(), ProviderId::all().len());
        for id in ProviderId::all() {
            let desc = ProviderRegistry::get(*id);
            assert!(desc.is_some(), "Should find provider {id:?}");
        }
    }

    #[test]
    fn test_display_order() {
        assert_eq!(ProviderRegistry::ids(), ProviderId::all().to_vec());
    }

    #[test]
    fn test_cli_name_lookup() {
        assert_eq!(
            ProviderRegistry::get_by_cli_name("Claude").map(|d| d.id),
            Some(ProviderId::Claude)
        );
        assert!(ProviderRegistry::get_by_cli_name("gemini").is_none());
    }

    #[test]
    fn test_probes_match_their_provider() {
        let catalog = ProviderRegistry;
        for id in catalog.ids() {
            let probe = catalog.probe(id).unwrap();
            assert_eq!(probe.provider(), id);
        }
    }

    #[test]
    fn test_allowed_hosts_cover_usage_endpoints() {
        let hosts = ProviderRegistry::allowed_hosts();
        for host in ["anthropic.com", "chatgpt.com", "github.com", "cursor.sh"] {
            assert!(hosts.iter().any(|h| h == host), "missing {host}");
        }
    }

    #[test]
    fn test_only_copilot_signs_in_by_itself() {
        let with_flow: Vec<ProviderId> = ProviderRegistry::all()
            .iter()
            .filter(|d| d.device_flow().is_some())
            .map(|d| d.id)
            .collect();
        assert_eq!(with_flow, vec![ProviderId::Copilot]);
    }

    #[test]
    fn test_default_enabled() {
        let enabled = ProviderRegistry::default_enabled();
        assert!(enabled.contains(&ProviderId::Claude));
        assert!(enabled.contains(&ProviderId::Codex));
    }
}
