//! Copilot response parsers.

use std::collections::HashMap;

use chrono::NaiveDate;
use openusage_core::{MetricLine, ProbeOutput, ProgressFormat, plan_label};
use openusage_fetch::ProbeError;
use tracing::debug;

use super::api::{QuotaSnapshot, UserResponse};

/// Quotas in display order.
const QUOTAS: [(&str, &str); 3] = [
    ("premium_interactions", "Premium"),
    ("chat", "Chat"),
    ("completions", "Completions"),
];

/// Parses the user endpoint body into metric lines.
pub fn parse_usage(body: &str) -> Result<ProbeOutput, ProbeError> {
    debug!(len = body.len(), "Parsing Copilot user response");
    let response: UserResponse = serde_json::from_str(body.trim())?;

    let mut lines = Vec::new();
    if let Some(snapshots) = &response.quota_snapshots {
        let resets_at = response.quota_reset_date.as_deref().and_then(date_to_iso);
        for (key, label) in QUOTAS {
            if let Some(line) = snapshots.get(key).and_then(|q| snapshot_line(label, q, resets_at.clone())) {
                lines.push(line);
            }
        }
    }
    if let (Some(remaining), Some(monthly)) = (&response.limited_user_quotas, &response.monthly_quotas) {
        let resets_at = response.limited_user_reset_date.as_deref().and_then(date_to_iso);
        lines.extend(free_lines(remaining, monthly, resets_at.as_ref()));
    }

    if lines.is_empty() {
        return Err(ProbeError::Malformed("no quotas in response".into()));
    }

    Ok(ProbeOutput {
        plan: response
            .copilot_plan
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(plan_label),
        lines,
    })
}

fn snapshot_line(label: &str, quota: &QuotaSnapshot, resets_at: Option<String>) -> Option<MetricLine> {
    if quota.unlimited == Some(true) {
        return Some(MetricLine::badge(label, "Unlimited"));
    }
    let used = match (quota.percent_remaining, quota.entitlement, quota.remaining) {
        (Some(pct), _, _) => 100.0 - pct,
        (None, Some(total), Some(left)) if total > 0.0 => (total - left) / total * 100.0,
        _ => return None,
    };
    Some(MetricLine::percent(label, used.clamp(0.0, 100.0), resets_at))
}

fn free_lines(
    remaining: &HashMap<String, f64>,
    monthly: &HashMap<String, f64>,
    resets_at: Option<&String>,
) -> Vec<MetricLine> {
    QUOTAS
        .iter()
        .filter_map(|(key, label)| {
            let total = *monthly.get(*key)?;
            let left = *remaining.get(*key)?;
            (total > 0.0).then(|| {
                MetricLine::progress(
                    *label,
                    (total - left).max(0.0),
                    total,
                    ProgressFormat::Count,
                    resets_at.cloned(),
                )
            })
        })
        .collect()
}

/// `2025-02-01` to `2025-02-01T00:00:00Z`.
fn date_to_iso(date: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()?;
    Some(format!("{}T00:00:00Z", date.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_core::ErrorKind;

    #[test]
    fn test_paid_plan() {
        let body = r#"{
            "copilot_plan": "individual",
            "quota_reset_date": "2025-02-01",
            "quota_snapshots": {
                "premium_interactions": {"entitlement": 300, "remaining": 120, "percent_remaining": 40.0, "unlimited": false},
                "chat": {"unlimited": true},
                "completions": {"unlimited": true}
            }
        }"#;
        let output = parse_usage(body).unwrap();
        assert_eq!(output.plan.as_deref(), Some("Individual"));
        assert_eq!(
            output.lines,
            vec![
                MetricLine::percent("Premium", 60.0, Some("2025-02-01T00:00:00Z".into())),
                MetricLine::badge("Chat", "Unlimited"),
                MetricLine::badge("Completions", "Unlimited"),
            ]
        );
    }

    #[test]
    fn test_free_plan() {
        let body = r#"{
            "copilot_plan": "free",
            "limited_user_quotas": {"chat": 40, "completions": 1500},
            "monthly_quotas": {"chat": 50, "completions": 2000},
            "limited_user_reset_date": "2025-02-01"
        }"#;
        let output = parse_usage(body).unwrap();
        assert_eq!(output.plan.as_deref(), Some("Free"));
        assert_eq!(
            output.lines[0],
            MetricLine::progress("Chat", 10.0, 50.0, ProgressFormat::Count, Some("2025-02-01T00:00:00Z".into()))
        );
        assert_eq!(output.lines.len(), 2);
    }

    #[test]
    fn test_no_quotas_is_malformed() {
        assert_eq!(
            parse_usage(r#"{"copilot_plan":"individual"}"#).unwrap_err().kind(),
            ErrorKind::MalformedResponse
        );
    }
}
