//! Cursor dashboard API (Connect protocol over JSON).
//!
//! ```text
//! POST https://api2.cursor.sh/aiserver.v1.DashboardService/GetCurrentPeriodUsage
//! Authorization: Bearer <access_token>
//! Connect-Protocol-Version: 1
//! {}
//! ```
//!
//! Amounts are in cents; 64-bit integers arrive as strings.
//!
//! ```json
//! {
//!   "billingCycleStart": "1735689600000",
//!   "billingCycleEnd": "1738368000000",
//!   "planUsage": {"includedSpend": 1234, "limit": 2000, "remaining": 766},
//!   "spendLimitUsage": {"individualLimit": 5000, "individualUsed": 100}
//! }
//! ```

use openusage_core::Credential;
use openusage_fetch::HttpRequest;
use serde_json::json;

/// Usage endpoint.
pub const USAGE_URL: &str =
    "https://api2.cursor.sh/aiserver.v1.DashboardService/GetCurrentPeriodUsage";

/// Builds the usage request for `credential`.
pub fn usage_request(credential: &Credential) -> HttpRequest {
    HttpRequest::post(USAGE_URL)
        .bearer(credential.bearer().unwrap_or_default())
        .header("Connect-Protocol-Version", "1")
        .json(&json!({}))
}
