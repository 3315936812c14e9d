//! Probe output, outcomes and the failure taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

// ============================================================================
// Metric Lines
// ============================================================================

/// How a progress line's `used`/`limit` values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressFormat {
    /// 0-100 percentage.
    Percent,
    /// US dollars.
    Dollars,
    /// Plain count (requests, messages).
    Count,
}

/// One line of probe output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricLine {
    /// Label/value pair.
    Text {
        /// Line label.
        label: String,
        /// Line value.
        value: String,
    },
    /// Quota consumption bar.
    Progress {
        /// Line label.
        label: String,
        /// Amount consumed.
        used: f64,
        /// Quota size.
        limit: f64,
        /// Rendering of `used`/`limit`.
        format: ProgressFormat,
        /// When the window resets (RFC 3339).
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "resetsAt")]
        resets_at: Option<String>,
    },
    /// Short status tag.
    Badge {
        /// Line label.
        label: String,
        /// Badge text.
        text: String,
    },
}

impl MetricLine {
    /// Creates a text line.
    pub fn text(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            label: label.into(),
            value: value.into(),
        }
    }

    /// Creates a percentage progress line.
    pub fn percent(label: impl Into<String>, used: f64, resets_at: Option<String>) -> Self {
        Self::Progress {
            label: label.into(),
            used,
            limit: 100.0,
            format: ProgressFormat::Percent,
            resets_at,
        }
    }

    /// Creates a progress line with an explicit limit and format.
    pub fn progress(
        label: impl Into<String>,
        used: f64,
        limit: f64,
        format: ProgressFormat,
        resets_at: Option<String>,
    ) -> Self {
        Self::Progress {
            label: label.into(),
            used,
            limit,
            format,
            resets_at,
        }
    }

    /// Creates a badge line.
    pub fn badge(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Badge {
            label: label.into(),
            text: text.into(),
        }
    }

    /// The line's label.
    pub fn label(&self) -> &str {
        match self {
            Self::Text { label, .. } | Self::Progress { label, .. } | Self::Badge { label, .. } => {
                label
            }
        }
    }
}

/// Successful probe output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutput {
    /// Plan/subscription label, already title-cased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Metric lines in display order.
    pub lines: Vec<MetricLine>,
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Closed set of probe failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ErrorKind {
    /// No credential could be found (or a sign-in is in progress).
    NotAuthenticated,
    /// The provider rejected the refresh token; the user must sign in again.
    ReAuthRequired,
    /// Requests kept failing with 401/403 after the one allowed refresh.
    AuthRetryExhausted,
    /// Transport failure or timeout.
    Network,
    /// Non-auth HTTP error status.
    ServerError(u16),
    /// The response could not be parsed.
    MalformedResponse,
    /// The account's auth mode cannot report usage.
    FeatureUnavailable,
}

impl ErrorKind {
    /// Generic user-facing message for this kind.
    pub fn default_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Not signed in. Sign in with the provider's app or CLI.".into(),
            Self::ReAuthRequired => "Session expired. Sign in again.".into(),
            Self::AuthRetryExhausted => "Token rejected. Sign in again.".into(),
            Self::Network => "Couldn't reach the server. Check your connection.".into(),
            Self::ServerError(status) => format!("Server error (HTTP {status}). Try again later."),
            Self::MalformedResponse => "Unexpected response from the server.".into(),
            Self::FeatureUnavailable => "Usage isn't available for this account type.".into(),
        }
    }

    /// Whether the user has to act on their credentials to recover.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::ReAuthRequired | Self::AuthRetryExhausted
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => f.write_str("not_authenticated"),
            Self::ReAuthRequired => f.write_str("reauth_required"),
            Self::AuthRetryExhausted => f.write_str("auth_retry_exhausted"),
            Self::Network => f.write_str("network"),
            Self::ServerError(status) => write!(f, "server_error({status})"),
            Self::MalformedResponse => f.write_str("malformed_response"),
            Self::FeatureUnavailable => f.write_str("feature_unavailable"),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one provider probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Usage fetched.
    Success(ProbeOutput),
    /// Probe failed.
    Error {
        /// Failure category.
        kind: ErrorKind,
        /// Short actionable message.
        message: String,
    },
}

impl ProbeOutcome {
    /// Creates an error outcome with the kind's default message.
    pub fn error(kind: ErrorKind) -> Self {
        Self::Error {
            kind,
            message: kind.default_message(),
        }
    }

    /// Whether the probe succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// A provider's probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Provider that was probed.
    pub provider_id: ProviderId,
    /// What happened.
    pub outcome: ProbeOutcome,
}

// ============================================================================
// Formatting
// ============================================================================

/// Title-cases every whitespace-separated word of a plan name.
///
/// Only a leading lowercase ASCII letter is changed; `"pro plus"` becomes
/// `"Pro Plus"` and `"eNTERPRISE"` becomes `"ENTERPRISE"`.
pub fn plan_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for ch in raw.trim().chars() {
        if at_word_start && ch.is_ascii_lowercase() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = ch.is_whitespace();
    }
    out
}

/// Formats a countdown as `"2d 3h"`, `"4h 5m"`, `"12m"` or `"<1m"`.
///
/// Returns `None` for negative durations.
pub fn reset_in(seconds_until: i64) -> Option<String> {
    if seconds_until < 0 {
        return None;
    }
    let total_minutes = seconds_until / 60;
    let total_hours = total_minutes / 60;
    let days = total_hours / 24;
    let hours = total_hours % 24;
    let minutes = total_minutes % 60;
    Some(if days > 0 {
        format!("{days}d {hours}h")
    } else if total_hours > 0 {
        format!("{total_hours}h {minutes}m")
    } else if total_minutes > 0 {
        format!("{total_minutes}m")
    } else {
        "<1m".to_string()
    })
}
