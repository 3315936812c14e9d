//! Cursor response parsers.

use chrono::{DateTime, SecondsFormat};
use openusage_core::{MetricLine, ProbeOutput, ProgressFormat, plan_label};
use openusage_fetch::ProbeError;
use serde_json::Value;
use tracing::debug;

/// Reads a number sent either as a JSON number or a string.
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses the usage body into metric lines.
pub fn parse_usage(body: &str, membership: Option<&str>) -> Result<ProbeOutput, ProbeError> {
    debug!(len = body.len(), "Parsing Cursor usage response");
    let response: Value = serde_json::from_str(body.trim())?;
    if !response.is_object() {
        return Err(ProbeError::Malformed("usage response is not an object".into()));
    }

    #[allow(clippy::cast_possible_truncation)]
    let resets_at = number(response.get("billingCycleEnd"))
        .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));

    let mut lines = Vec::new();
    if let Some(plan) = response.get("planUsage") {
        let limit = number(plan.get("limit"));
        let used = number(plan.get("includedSpend"))
            .or_else(|| number(plan.get("totalSpend")))
            .or_else(|| Some(limit? - number(plan.get("remaining"))?));
        if let (Some(used), Some(limit)) = (used, limit.filter(|l| *l > 0.0)) {
            lines.push(MetricLine::progress(
                "Plan usage",
                used / 100.0,
                limit / 100.0,
                ProgressFormat::Dollars,
                resets_at.clone(),
            ));
        }
    }
    if let Some(spend) = response.get("spendLimitUsage") {
        let limit = number(spend.get("individualLimit")).filter(|l| *l > 0.0);
        if let Some(limit) = limit {
            let used = number(spend.get("individualUsed")).unwrap_or(0.0);
            lines.push(MetricLine::progress(
                "On-demand",
                used / 100.0,
                limit / 100.0,
                ProgressFormat::Dollars,
                resets_at.clone(),
            ));
        }
    }

    if lines.is_empty() {
        return Err(ProbeError::Malformed("no plan usage in response".into()));
    }

    Ok(ProbeOutput {
        plan: membership.filter(|m| !m.is_empty()).map(plan_label),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_core::ErrorKind;

    #[test]
    fn test_plan_usage_with_string_numbers() {
        let body = r#"{
            "billingCycleStart": "1735689600000",
            "billingCycleEnd": "1738368000000",
            "planUsage": {"includedSpend": "1234", "limit": 2000, "remaining": 766},
            "spendLimitUsage": {"individualLimit": 0}
        }"#;
        let output = parse_usage(body, Some("pro")).unwrap();
        assert_eq!(output.plan.as_deref(), Some("Pro"));
        assert_eq!(
            output.lines,
            vec![MetricLine::progress(
                "Plan usage",
                12.34,
                20.0,
                ProgressFormat::Dollars,
                Some("2025-02-01T00:00:00Z".into())
            )]
        );
    }

    #[test]
    fn test_on_demand_spend() {
        let body = r#"{
            "planUsage": {"limit": 2000, "remaining": 0},
            "spendLimitUsage": {"individualLimit": 5000, "individualUsed": 250}
        }"#;
        let output = parse_usage(body, None).unwrap();
        assert_eq!(output.lines.len(), 2);
        assert_eq!(
            output.lines[1],
            MetricLine::progress("On-demand", 2.5, 50.0, ProgressFormat::Dollars, None)
        );
    }

    #[test]
    fn test_missing_usage_is_malformed() {
        assert_eq!(
            parse_usage("{}", None).unwrap_err().kind(),
            ErrorKind::MalformedResponse
        );
    }
}
