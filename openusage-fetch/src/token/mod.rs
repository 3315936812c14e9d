//! Token lifecycle: when to refresh, how to refresh, and coordination of
//! concurrent refreshes.

pub mod jwt;
pub mod manager;
pub mod oauth;
pub mod policy;

pub use manager::{RefreshOutcome, RefreshPhase, TokenManager};
pub use oauth::{BodyEncoding, OAuthRefresher};
pub use policy::{
    EXPIRY_BUFFER, MAX_TOKEN_AGE, RefreshRejected, RefreshTrigger, TokenGrant, TokenPolicy,
    TokenRefresher, needs_refresh_by_expiry,
};
