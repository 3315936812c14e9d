//! Copilot internal user API.
//!
//! # API Endpoint
//!
//! ```text
//! GET https://api.github.com/copilot_internal/user
//! Authorization: token <github_token>
//! ```
//!
//! # Response Format
//!
//! Paid plans report quota snapshots:
//!
//! ```json
//! {
//!   "copilot_plan": "individual",
//!   "quota_reset_date": "2025-02-01",
//!   "quota_snapshots": {
//!     "premium_interactions": {"entitlement": 300, "remaining": 120, "percent_remaining": 40.0, "unlimited": false},
//!     "chat": {"unlimited": true}
//!   }
//! }
//! ```
//!
//! The free plan reports remaining and monthly counts instead:
//!
//! ```json
//! {
//!   "copilot_plan": "free",
//!   "limited_user_quotas": {"chat": 40, "completions": 1500},
//!   "monthly_quotas": {"chat": 50, "completions": 2000},
//!   "limited_user_reset_date": "2025-02-01"
//! }
//! ```

use std::collections::HashMap;

use openusage_core::Credential;
use openusage_fetch::HttpRequest;
use serde::Deserialize;

/// Usage endpoint.
pub const USAGE_URL: &str = "https://api.github.com/copilot_internal/user";

const EDITOR_VERSION: &str = "vscode/1.96.2";
const PLUGIN_VERSION: &str = "copilot-chat/0.26.7";
const API_VERSION: &str = "2025-04-01";

/// Builds the usage request for `credential`.
pub fn usage_request(credential: &Credential) -> HttpRequest {
    HttpRequest::get(USAGE_URL)
        .header(
            "Authorization",
            format!("token {}", credential.bearer().unwrap_or_default()),
        )
        .header("Accept", "application/json")
        .header("Editor-Version", EDITOR_VERSION)
        .header("Editor-Plugin-Version", PLUGIN_VERSION)
        .header("X-Github-Api-Version", API_VERSION)
}

// ============================================================================
// API Response Types
// ============================================================================

/// Response from the user endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserResponse {
    /// Plan name (`free`, `individual`, `business`, ...).
    #[serde(default)]
    pub copilot_plan: Option<String>,
    /// Reset date of paid quotas (`YYYY-MM-DD`).
    #[serde(default)]
    pub quota_reset_date: Option<String>,
    /// Paid quotas by name.
    #[serde(default)]
    pub quota_snapshots: Option<HashMap<String, QuotaSnapshot>>,
    /// Free plan remaining counts.
    #[serde(default)]
    pub limited_user_quotas: Option<HashMap<String, f64>>,
    /// Free plan monthly allowances.
    #[serde(default)]
    pub monthly_quotas: Option<HashMap<String, f64>>,
    /// Reset date of free quotas.
    #[serde(default)]
    pub limited_user_reset_date: Option<String>,
}

/// One paid quota.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaSnapshot {
    /// Allowance.
    #[serde(default)]
    pub entitlement: Option<f64>,
    /// Left this period.
    #[serde(default)]
    pub remaining: Option<f64>,
    /// Left this period, in percent.
    #[serde(default)]
    pub percent_remaining: Option<f64>,
    /// No limit applies.
    #[serde(default)]
    pub unlimited: Option<bool>,
}
