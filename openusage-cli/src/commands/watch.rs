//! Watch command - keeps refreshing and redraws on every change.

use std::io::{Write, stdout};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Args;
use openusage_providers::{ProviderDescriptor, ProviderRegistry};
use openusage_store::{BatchRequest, BatchTrigger, Orchestrator, RefreshCadence, SettingsStore};
use tracing::info;

use crate::app;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Refresh cadence for this session: manual, 1m, 2m, 5m or 15m.
    /// Defaults to the configured cadence.
    #[arg(long, short)]
    pub interval: Option<String>,
}

/// Runs the watch command.
pub async fn run(args: &WatchArgs, cli: &Cli, settings: Arc<SettingsStore>) -> Result<ExitCode> {
    // Session overrides, never saved.
    if let Some(raw) = &args.interval {
        let cadence = RefreshCadence::parse(raw).ok_or_else(|| {
            anyhow::anyhow!("Invalid interval: {raw} (use manual, 1m, 2m, 5m or 15m)")
        })?;
        settings.update(|s| s.refresh_cadence = cadence).await;
    }

    if let Some(selected) = app::provider_selection(cli.provider.as_deref())? {
        settings.update(|s| s.enabled_providers = selected).await;
    }

    let orchestrator = app::orchestrator(cli, settings.clone()).await?;
    let cadence = settings.refresh_cadence().await;
    info!(cadence = %cadence, "Starting watch mode");

    let mut changes = orchestrator.usage().subscribe();
    orchestrator
        .start_batch(BatchRequest::enabled(BatchTrigger::Startup))
        .await;

    let redraw = async {
        loop {
            render(cli, &orchestrator, cadence).await?;
            if changes.changed().await.is_err() {
                return Ok::<(), anyhow::Error>(());
            }
        }
    };

    tokio::select! {
        () = orchestrator.run_auto_refresh() => {}
        result = redraw => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, leaving watch mode");
        }
    }

    Ok(ExitCode::Success)
}

async fn render(cli: &Cli, orchestrator: &Orchestrator, cadence: RefreshCadence) -> Result<()> {
    let states = orchestrator.usage().all().await;

    if cli.format == OutputFormat::Json {
        println!("{}", JsonFormatter::new(false).format_states(&states)?);
        return Ok(());
    }

    let formatter = TextFormatter::new(!cli.no_color);
    let mut out = stdout();
    // Clear screen
    write!(out, "\x1b[2J\x1b[H")?;
    writeln!(
        out,
        "OpenUsage Watch - {} (refresh: {cadence})",
        Local::now().format("%H:%M:%S")
    )?;
    writeln!(out, "{}", "─".repeat(50))?;
    writeln!(out)?;

    let now = Utc::now();
    for (id, state) in &states {
        let name = ProviderRegistry::get(*id)
            .map_or_else(|| id.display_name(), ProviderDescriptor::display_name);
        writeln!(out, "{}\n", formatter.format_state(name, state, now))?;
    }
    if states.is_empty() {
        writeln!(out, "{}\n", formatter.dim("No providers enabled"))?;
    }

    writeln!(out, "Press Ctrl+C to exit")?;
    out.flush()?;
    Ok(())
}
