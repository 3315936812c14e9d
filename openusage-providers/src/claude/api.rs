//! Anthropic OAuth usage API.
//!
//! # API Endpoint
//!
//! ```text
//! GET https://api.anthropic.com/api/oauth/usage
//! Authorization: Bearer <access_token>
//! anthropic-beta: oauth-2025-04-20
//! ```
//!
//! # Response Format
//!
//! ```json
//! {
//!   "five_hour": {"utilization": 25.0, "resets_at": "2025-01-01T12:00:00Z"},
//!   "seven_day": {"utilization": 45.0, "resets_at": "2025-01-05T00:00:00Z"},
//!   "seven_day_opus": {"utilization": 30.0, "resets_at": null},
//!   "extra_usage": {"is_enabled": true, "used_credits": 500, "monthly_limit": 10000}
//! }
//! ```

use openusage_core::Credential;
use openusage_fetch::HttpRequest;
use serde::Deserialize;

/// Usage endpoint.
pub const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";

/// Beta header required for OAuth tokens.
const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Builds the usage request for `credential`.
pub fn usage_request(credential: &Credential) -> HttpRequest {
    HttpRequest::get(USAGE_URL)
        .bearer(credential.bearer().unwrap_or_default())
        .header("Accept", "application/json")
        .header("anthropic-beta", OAUTH_BETA)
}

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from the usage API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageResponse {
    /// 5-hour session window.
    #[serde(default)]
    pub five_hour: Option<UsageWindow>,
    /// 7-day window (all models).
    #[serde(default)]
    pub seven_day: Option<UsageWindow>,
    /// 7-day Opus window.
    #[serde(default)]
    pub seven_day_opus: Option<UsageWindow>,
    /// 7-day Sonnet window.
    #[serde(default)]
    pub seven_day_sonnet: Option<UsageWindow>,
    /// Pay-as-you-go overage.
    #[serde(default)]
    pub extra_usage: Option<ExtraUsage>,
}

/// Individual usage window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageWindow {
    /// Used percentage (0-100).
    #[serde(default)]
    pub utilization: Option<f64>,
    /// When this window resets (ISO 8601).
    #[serde(default)]
    pub resets_at: Option<String>,
}

/// Extra usage credits, in cents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtraUsage {
    /// Whether extra usage is enabled.
    #[serde(default)]
    pub is_enabled: Option<bool>,
    /// Credits used this month.
    #[serde(default)]
    pub used_credits: Option<f64>,
    /// Monthly credit limit.
    #[serde(default)]
    pub monthly_limit: Option<f64>,
}
