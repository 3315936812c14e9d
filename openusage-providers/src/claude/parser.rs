//! Claude response parsers.

use openusage_core::{MetricLine, ProbeOutput, ProgressFormat, plan_label};
use openusage_fetch::ProbeError;
use tracing::debug;

use super::api::{UsageResponse, UsageWindow};

/// Parses the usage API body into metric lines.
pub fn parse_usage(body: &str, subscription_type: Option<&str>) -> Result<ProbeOutput, ProbeError> {
    debug!(len = body.len(), "Parsing Claude usage response");
    let response: UsageResponse = serde_json::from_str(body.trim())?;

    let windows = [
        ("Session", &response.five_hour),
        ("Weekly", &response.seven_day),
        ("Opus", &response.seven_day_opus),
        ("Sonnet", &response.seven_day_sonnet),
    ];
    let mut lines: Vec<MetricLine> = windows
        .into_iter()
        .filter_map(|(label, window)| window_line(label, window.as_ref()?))
        .collect();

    if let Some(extra) = response.extra_usage.as_ref().filter(|e| e.is_enabled == Some(true)) {
        if let Some(limit) = extra.monthly_limit.filter(|l| *l > 0.0) {
            lines.push(MetricLine::progress(
                "Extra usage",
                extra.used_credits.unwrap_or(0.0) / 100.0,
                limit / 100.0,
                ProgressFormat::Dollars,
                None,
            ));
        }
    }

    if lines.is_empty() {
        return Err(ProbeError::Malformed("no usage windows in response".into()));
    }

    Ok(ProbeOutput {
        plan: subscription_type.filter(|s| !s.is_empty()).map(plan_label),
        lines,
    })
}

fn window_line(label: &str, window: &UsageWindow) -> Option<MetricLine> {
    let used = window.utilization?;
    Some(MetricLine::percent(label, used.clamp(0.0, 100.0), window.resets_at.clone()))
}
