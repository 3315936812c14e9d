//! Usage command - one probe batch, printed once.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use openusage_core::{ProbeOutcome, ProbeResult};
use openusage_providers::{ProviderDescriptor, ProviderRegistry};
use openusage_store::{BatchRequest, BatchTrigger, SettingsStore};
use tracing::{debug, info};

use crate::app;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the usage command.
pub async fn run(cli: &Cli, settings: Arc<SettingsStore>) -> Result<ExitCode> {
    let provider_ids = app::provider_selection(cli.provider.as_deref())?;
    let orchestrator = app::orchestrator(cli, settings).await?;

    let request = BatchRequest {
        batch_id: None,
        provider_ids,
        trigger: BatchTrigger::Startup,
    };
    let (started, results) = orchestrator.run_batch(request).await;
    debug!(batch_id = %started.batch_id, providers = started.provider_ids.len(), "Batch finished");

    if results.is_empty() {
        info!("No providers enabled");
        if cli.format == OutputFormat::Text && !cli.quiet {
            println!("No providers enabled. Enable one with `openusage config enable <provider>`.");
        }
    }

    match cli.format {
        OutputFormat::Text => print_text(cli, &results),
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_results(&results)?);
        }
    }

    let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
    Ok(if failed > 0 {
        ExitCode::Error
    } else {
        ExitCode::Success
    })
}

fn print_text(cli: &Cli, results: &[ProbeResult]) {
    let formatter = TextFormatter::new(!cli.no_color);
    let now = Utc::now();

    let blocks: Vec<String> = results
        .iter()
        .map(|result| {
            let name = ProviderRegistry::get(result.provider_id)
                .map_or_else(|| result.provider_id.display_name(), ProviderDescriptor::display_name);
            match &result.outcome {
                ProbeOutcome::Success(output) => formatter.format_output(name, output, now),
                ProbeOutcome::Error { message, .. } => formatter.format_error(name, message),
            }
        })
        .collect();

    if !blocks.is_empty() {
        println!("{}", blocks.join("\n\n"));
    }
}
