//! Wiring shared by the commands: settings, probe context, orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use openusage_core::ProviderId;
use openusage_fetch::{HttpClient, ProbeContext};
use openusage_providers::ProviderRegistry;
use openusage_store::{
    Orchestrator, SettingsStore, UsageStore, default_config_dir, default_data_dir, settings_path,
};

use crate::Cli;

/// Config directory, honoring `--config-dir`.
pub fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(default_config_dir)
}

/// Data directory, honoring `--data-dir`.
pub fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(default_data_dir)
}

/// Loads `settings.json` from the config directory.
pub async fn load_settings(cli: &Cli) -> Result<Arc<SettingsStore>> {
    let store = SettingsStore::load(settings_path(&config_dir(cli))).await?;
    Ok(Arc::new(store))
}

/// Builds the probe context: HTTP restricted to provider hosts, the
/// configured HTTP timeout, and the data directory.
pub async fn probe_context(cli: &Cli, settings: &SettingsStore) -> Result<ProbeContext> {
    let http_timeout = settings.get().await.http_timeout();
    let http = HttpClient::with_timeout(http_timeout)
        .context("Failed to create HTTP client")?
        .allowed_domains(ProviderRegistry::allowed_hosts());

    let ctx = ProbeContext::builder()
        .http(Arc::new(http))
        .http_timeout(http_timeout)
        .data_dir(data_dir(cli))
        .build()?;
    Ok(ctx)
}

/// Builds an orchestrator over every registered provider.
pub async fn orchestrator(cli: &Cli, settings: Arc<SettingsStore>) -> Result<Orchestrator> {
    let ctx = probe_context(cli, &settings).await?;
    Ok(Orchestrator::new(
        Arc::new(ctx),
        Arc::new(ProviderRegistry),
        settings,
        Arc::new(UsageStore::new()),
    ))
}

/// Parses the global `--provider` selection.
///
/// `None` means "enabled providers"; `all` selects every provider.
pub fn provider_selection(arg: Option<&str>) -> Result<Option<Vec<ProviderId>>> {
    let Some(arg) = arg.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if arg.eq_ignore_ascii_case("all") {
        return Ok(Some(ProviderRegistry::ids()));
    }

    let mut providers = Vec::new();
    for name in arg.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let desc = ProviderRegistry::get_by_cli_name(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {name}"))?;
        providers.push(desc.id);
    }
    if providers.is_empty() {
        anyhow::bail!("No valid providers specified");
    }
    Ok(Some(providers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_default_is_enabled() {
        assert!(provider_selection(None).unwrap().is_none());
        assert!(provider_selection(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn test_selection_all() {
        assert_eq!(
            provider_selection(Some("ALL")).unwrap(),
            Some(ProviderRegistry::ids())
        );
    }

    #[test]
    fn test_selection_comma_separated() {
        assert_eq!(
            provider_selection(Some("cursor, claude")).unwrap(),
            Some(vec![ProviderId::Cursor, ProviderId::Claude])
        );
    }

    #[test]
    fn test_selection_unknown() {
        assert!(provider_selection(Some("codex,gemini")).is_err());
    }
}
