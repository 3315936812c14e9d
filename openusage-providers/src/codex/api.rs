//! ChatGPT usage API as used by the Codex CLI.
//!
//! # API Endpoint
//!
//! ```text
//! GET https://chatgpt.com/backend-api/wham/usage
//! Authorization: Bearer <access_token>
//! ChatGPT-Account-Id: <account_id>
//! ```
//!
//! # Response Format
//!
//! ```json
//! {
//!   "plan_type": "plus",
//!   "rate_limit": {
//!     "primary_window": {"used_percent": 12, "limit_window_seconds": 18000, "reset_at": 1735000000},
//!     "secondary_window": {"used_percent": 40, "limit_window_seconds": 604800, "reset_after_seconds": 86400}
//!   },
//!   "credits": {"has_credits": true, "unlimited": false, "balance": "5.00"}
//! }
//! ```

use openusage_core::Credential;
use openusage_fetch::HttpRequest;
use serde::Deserialize;
use serde_json::Value;

/// Usage endpoint.
pub const USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";

/// Builds the usage request for `credential`.
pub fn usage_request(credential: &Credential) -> HttpRequest {
    let request = HttpRequest::get(USAGE_URL)
        .bearer(credential.bearer().unwrap_or_default())
        .header("Accept", "application/json");
    match credential.account_id.as_deref() {
        Some(account) => request.header("ChatGPT-Account-Id", account),
        None => request,
    }
}

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from the usage API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageResponse {
    /// Subscription plan (`plus`, `pro`, `team`, ...).
    #[serde(default)]
    pub plan_type: Option<String>,
    /// Rate limit windows.
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Credit balance.
    #[serde(default)]
    pub credits: Option<Credits>,
}

/// Rate limit windows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimit {
    /// Short (session) window.
    #[serde(default)]
    pub primary_window: Option<RateWindow>,
    /// Long (weekly) window.
    #[serde(default)]
    pub secondary_window: Option<RateWindow>,
}

/// One rate limit window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateWindow {
    /// Used percentage (0-100).
    #[serde(default)]
    pub used_percent: Option<f64>,
    /// Window length.
    #[serde(default)]
    pub limit_window_seconds: Option<i64>,
    /// Seconds until the window resets.
    #[serde(default)]
    pub reset_after_seconds: Option<i64>,
    /// Reset time in epoch seconds.
    #[serde(default)]
    pub reset_at: Option<i64>,
}

/// Credit balance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    /// Whether the account has credits.
    #[serde(default)]
    pub has_credits: Option<bool>,
    /// Unlimited credits.
    #[serde(default)]
    pub unlimited: Option<bool>,
    /// Balance; sent as a string or a number.
    #[serde(default)]
    pub balance: Option<Value>,
}
