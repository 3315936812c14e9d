//! Providers command - list available providers.

use anyhow::Result;
use openusage_providers::ProviderRegistry;
use openusage_store::SettingsStore;
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the providers command.
pub async fn run(cli: &Cli, settings: &SettingsStore) -> Result<ExitCode> {
    info!("Listing providers");

    let providers = ProviderRegistry::all();
    let enabled = settings.enabled_providers().await;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);

            println!("{}", formatter.format_providers_header());
            println!("{}", "─".repeat(70));

            for desc in providers {
                println!("{}", formatter.format_provider_line(desc, enabled.contains(&desc.id)));
            }

            println!();
            println!(
                "Total: {} providers ({} enabled)",
                providers.len(),
                providers.iter().filter(|d| enabled.contains(&d.id)).count()
            );
            let login: Vec<&str> = providers
                .iter()
                .filter(|d| d.device_flow.is_some())
                .map(|d| d.cli_name())
                .collect();
            if !login.is_empty() {
                println!("Sign in with `openusage login`: {}", login.join(", "));
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_providers(providers, &enabled)?);
        }
    }

    Ok(ExitCode::Success)
}
