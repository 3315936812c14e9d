//! Codex response parsers.

use chrono::{DateTime, SecondsFormat};
use openusage_core::{MetricLine, ProbeOutput, plan_label};
use openusage_fetch::ProbeError;
use serde_json::Value;
use tracing::debug;

use super::api::{Credits, RateWindow, UsageResponse};

/// Parses the usage API body into metric lines.
pub fn parse_usage(body: &str, now_ms: i64) -> Result<ProbeOutput, ProbeError> {
    debug!(len = body.len(), "Parsing Codex usage response");
    let response: UsageResponse = serde_json::from_str(body.trim())?;

    let mut lines = Vec::new();
    if let Some(limits) = &response.rate_limit {
        let windows = [
            ("Session", &limits.primary_window),
            ("Weekly", &limits.secondary_window),
        ];
        for (label, window) in windows {
            if let Some(line) = window.as_ref().and_then(|w| window_line(label, w, now_ms)) {
                lines.push(line);
            }
        }
    }
    if let Some(line) = response.credits.as_ref().and_then(credits_line) {
        lines.push(line);
    }

    if lines.is_empty() {
        return Err(ProbeError::Malformed("no rate limits in response".into()));
    }

    Ok(ProbeOutput {
        plan: response
            .plan_type
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(plan_label),
        lines,
    })
}

fn window_line(label: &str, window: &RateWindow, now_ms: i64) -> Option<MetricLine> {
    let used = window.used_percent?;
    let reset_ms = window
        .reset_at
        .map(|secs| secs.saturating_mul(1000))
        .or_else(|| {
            window
                .reset_after_seconds
                .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)))
        });
    let resets_at = reset_ms
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));
    Some(MetricLine::percent(label, used.clamp(0.0, 100.0), resets_at))
}

fn credits_line(credits: &Credits) -> Option<MetricLine> {
    if credits.unlimited == Some(true) {
        return Some(MetricLine::badge("Credits", "Unlimited"));
    }
    if credits.has_credits != Some(true) {
        return None;
    }
    let balance = match credits.balance.as_ref()? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some(MetricLine::text("Credits", format!("${balance:.2}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_core::ErrorKind;

    const NOW: i64 = 1_735_689_600_000;

    #[test]
    fn test_parse_windows() {
        let body = r#"{
            "plan_type": "plus",
            "rate_limit": {
                "primary_window": {"used_percent": 12, "limit_window_seconds": 18000, "reset_at": 1735693200},
                "secondary_window": {"used_percent": 40.5, "reset_after_seconds": 86400}
            }
        }"#;
        let output = parse_usage(body, NOW).unwrap();
        assert_eq!(output.plan.as_deref(), Some("Plus"));
        assert_eq!(
            output.lines,
            vec![
                MetricLine::percent("Session", 12.0, Some("2025-01-01T01:00:00Z".into())),
                MetricLine::percent("Weekly", 40.5, Some("2025-01-02T00:00:00Z".into())),
            ]
        );
    }

    #[test]
    fn test_credits() {
        let body = r#"{
            "rate_limit": {"primary_window": {"used_percent": 0}},
            "credits": {"has_credits": true, "unlimited": false, "balance": "5.5"}
        }"#;
        let output = parse_usage(body, NOW).unwrap();
        assert_eq!(output.lines[1], MetricLine::text("Credits", "$5.50"));
    }

    #[test]
    fn test_no_limits_is_malformed() {
        assert_eq!(
            parse_usage(r#"{"plan_type":"free"}"#, NOW).unwrap_err().kind(),
            ErrorKind::MalformedResponse
        );
    }
}
