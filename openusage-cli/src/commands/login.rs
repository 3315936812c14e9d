//! Login command - device-code sign-in for providers that support it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use openusage_fetch::{DeviceFlow, DeviceFlowState, ProbeContext, ProbeError};
use openusage_providers::ProviderRegistry;
use openusage_store::SettingsStore;
use tracing::{debug, info};

use crate::app;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

const MIN_POLL_DELAY: Duration = Duration::from_secs(1);

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Provider to sign in to.
    pub provider: String,

    /// Forget a sign-in that is waiting for approval.
    #[arg(long)]
    pub cancel: bool,
}

/// Runs the login command.
pub async fn run(args: &LoginArgs, cli: &Cli, settings: Arc<SettingsStore>) -> Result<ExitCode> {
    let desc = ProviderRegistry::get_by_cli_name(&args.provider)
        .ok_or_else(|| anyhow::anyhow!("Unknown provider: {}", args.provider))?;
    let flow = desc.device_flow().ok_or_else(|| {
        anyhow::anyhow!(
            "{} can't sign in from here. Sign in with its own app or CLI.",
            desc.display_name()
        )
    })?;
    let ctx = app::probe_context(cli, &settings).await?;

    if args.cancel {
        flow.cancel(&ctx).await;
        println!("Cancelled pending sign-in for {}", desc.display_name());
        return Ok(ExitCode::Success);
    }

    let probe = desc.probe();
    let mut shown_code: Option<String> = None;
    loop {
        match probe.probe(&ctx).await {
            Ok(output) => {
                info!(provider = %desc.id, "Signed in");
                match cli.format {
                    OutputFormat::Text => {
                        let formatter = TextFormatter::new(!cli.no_color);
                        println!(
                            "{} {}\n",
                            formatter.green("✓"),
                            formatter.bold(&format!("Signed in to {}", desc.display_name()))
                        );
                        println!("{}", formatter.format_output(desc.display_name(), &output, Utc::now()));
                    }
                    OutputFormat::Json => {
                        println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
                    }
                }
                return Ok(ExitCode::Success);
            }
            Err(ProbeError::DeviceFlowPending {
                verification_uri,
                user_code,
            }) => {
                if shown_code.as_deref() != Some(user_code.as_str()) {
                    // Instructions go to stderr so JSON output stays parseable.
                    eprintln!("Open {verification_uri} and enter the code: {user_code}");
                    eprintln!("Waiting for approval (Ctrl+C to stop)...");
                    shown_code = Some(user_code);
                }
                let delay = next_poll_delay(&flow, &ctx).await;
                debug!(delay_ms = delay.as_millis(), "Waiting before next poll");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    signal = tokio::signal::ctrl_c() => {
                        signal?;
                        eprintln!("Sign-in paused. Run `openusage login {}` to resume.", desc.cli_name());
                        return Ok(ExitCode::Error);
                    }
                }
            }
            Err(e) => anyhow::bail!("{}", e.user_message()),
        }
    }
}

/// Time left until the pending authorization may be polled again.
async fn next_poll_delay(flow: &DeviceFlow, ctx: &ProbeContext) -> Duration {
    let DeviceFlowState::Pending(pending) = flow.load(ctx).await else {
        return MIN_POLL_DELAY;
    };
    let interval_ms = pending.interval_secs.saturating_mul(1000);
    let elapsed_ms = pending
        .last_poll_at_ms
        .map_or(0, |last| u64::try_from(ctx.now_ms().saturating_sub(last)).unwrap_or(0));
    Duration::from_millis(interval_ms.saturating_sub(elapsed_ms)).max(MIN_POLL_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_fetch::{Method, testing::TestHost};
    use openusage_providers::copilot::github_device_flow;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_delay_without_pending_flow() {
        let dir = TempDir::new().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        assert_eq!(next_poll_delay(&github_device_flow(), &host.ctx).await, MIN_POLL_DELAY);
    }

    #[tokio::test]
    async fn test_delay_follows_interval() {
        let dir = TempDir::new().unwrap();
        let host = TestHost::new(dir.path(), NOW);
        let flow = github_device_flow();
        host.http.on(
            Method::Post,
            &flow.config().device_code_url,
            200,
            r#"{"device_code":"dc","user_code":"WDJB-MJHT","verification_uri":"https://github.com/login/device","expires_in":899,"interval":5}"#,
        );

        assert!(flow.step(&host.ctx).await.is_err());
        // Fresh flow: never polled, full interval ahead.
        assert_eq!(next_poll_delay(&flow, &host.ctx).await, Duration::from_secs(5));
    }
}
