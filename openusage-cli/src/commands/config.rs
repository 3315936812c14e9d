//! Config command - manage configuration.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use openusage_core::{ProbeOutcome, ProbeResult};
use openusage_providers::{ProviderDescriptor, ProviderRegistry};
use openusage_store::{
    BatchStarted, Orchestrator, ProbeEvent, RefreshCadence, Settings, SettingsStore,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::app;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Enable a provider and fetch its usage.
    Enable {
        /// Provider to enable.
        provider: String,
    },

    /// Disable a provider.
    Disable {
        /// Provider to disable.
        provider: String,
    },

    /// Set auto-refresh cadence.
    Cadence {
        /// Cadence: manual, 1m, 2m, 5m, 15m.
        cadence: String,
    },

    /// Reset to defaults.
    Reset,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli, settings: Arc<SettingsStore>) -> Result<ExitCode> {
    match &args.action {
        ConfigAction::Show => show_config(cli, &settings).await,
        ConfigAction::Enable { provider } => set_enabled(provider, true, cli, settings).await,
        ConfigAction::Disable { provider } => set_enabled(provider, false, cli, settings).await,
        ConfigAction::Cadence { cadence } => set_cadence(cadence, &settings).await,
        ConfigAction::Reset => reset_config(&settings).await,
    }
}

async fn show_config(cli: &Cli, store: &SettingsStore) -> Result<ExitCode> {
    let settings = store.get().await;

    match cli.format {
        OutputFormat::Text => {
            println!("OpenUsage Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!("Enabled providers:");
            for provider in &settings.enabled_providers {
                if let Some(desc) = ProviderRegistry::get(*provider) {
                    println!("  • {}", desc.display_name());
                }
            }
            println!();
            println!("Refresh cadence: {}", settings.refresh_cadence);
            println!("Probe timeout: {}s", settings.probe_timeout().as_secs());
            println!("HTTP timeout: {}s", settings.http_timeout().as_secs());
            println!(
                "Manual refresh cooldown: {}s",
                settings.manual_refresh_cooldown().as_secs()
            );
            println!("Log level: {}", settings.log_level);
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&settings)?);
        }
    }

    Ok(ExitCode::Success)
}

async fn set_enabled(
    name: &str,
    enabled: bool,
    cli: &Cli,
    settings: Arc<SettingsStore>,
) -> Result<ExitCode> {
    let desc = ProviderRegistry::get_by_cli_name(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown provider: {name}"))?;

    let orchestrator = app::orchestrator(cli, settings).await?;
    let mut events = orchestrator.subscribe();
    let started = orchestrator.set_provider_enabled(desc.id, enabled).await?;

    if !enabled {
        info!(provider = %desc.display_name(), "Provider disabled");
        println!("Disabled: {}", desc.display_name());
        return Ok(ExitCode::Success);
    }

    info!(provider = %desc.display_name(), "Provider enabled");
    println!("Enabled: {}", desc.display_name());

    let Some(started) = started else {
        return Ok(ExitCode::Success);
    };
    let Some(result) = first_result(&orchestrator, &mut events, &started).await else {
        return Ok(ExitCode::Error);
    };
    println!();
    Ok(print_result(cli, desc, &result))
}

/// Waits for the first result of `started`.
async fn first_result(
    orchestrator: &Orchestrator,
    events: &mut broadcast::Receiver<ProbeEvent>,
    started: &BatchStarted,
) -> Option<ProbeResult> {
    loop {
        match events.recv().await {
            Ok(ProbeEvent::Result { batch_id, result }) if batch_id == started.batch_id => {
                return Some(result);
            }
            Ok(ProbeEvent::BatchComplete { batch_id }) if batch_id == started.batch_id => {
                return None;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed probe events");
                let provider = started.provider_ids.first()?;
                let state = orchestrator.usage().get(*provider).await?;
                return state.data.map(|output| ProbeResult {
                    provider_id: *provider,
                    outcome: ProbeOutcome::Success(output),
                });
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn print_result(cli: &Cli, desc: &ProviderDescriptor, result: &ProbeResult) -> ExitCode {
    let code = if result.outcome.is_success() {
        ExitCode::Success
    } else {
        ExitCode::Error
    };
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            let text = match &result.outcome {
                ProbeOutcome::Success(output) => {
                    formatter.format_output(desc.display_name(), output, Utc::now())
                }
                ProbeOutcome::Error { message, .. } => {
                    formatter.format_error(desc.display_name(), message)
                }
            };
            println!("{text}");
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            match formatter.format_results(std::slice::from_ref(result)) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "Failed to format result"),
            }
        }
    }
    code
}

async fn set_cadence(cadence_str: &str, store: &SettingsStore) -> Result<ExitCode> {
    let cadence = RefreshCadence::parse(cadence_str).ok_or_else(|| {
        anyhow::anyhow!("Invalid cadence: {cadence_str} (use manual, 1m, 2m, 5m or 15m)")
    })?;

    store.set_refresh_cadence(cadence).await;
    store.save().await?;

    info!(cadence = %cadence, "Refresh cadence updated");
    println!("Refresh cadence set to: {cadence}");

    Ok(ExitCode::Success)
}

async fn reset_config(store: &SettingsStore) -> Result<ExitCode> {
    store.update(|s| *s = Settings::default()).await;
    store.save().await?;

    info!("Configuration reset to defaults");
    println!("Configuration reset to defaults");

    Ok(ExitCode::Success)
}
