//! Codex (OpenAI) provider implementation.
//!
//! Reads the ChatGPT sign-in the Codex CLI keeps in `auth.json` and calls
//! the ChatGPT usage endpoint.
//!
//! # Auth.json Format
//!
//! ```json
//! {
//!   "OPENAI_API_KEY": null,
//!   "tokens": {
//!     "id_token": "eyJ...",
//!     "access_token": "eyJ...",
//!     "refresh_token": "...",
//!     "account_id": "..."
//!   },
//!   "last_refresh": "2025-01-01T00:00:00Z"
//! }
//! ```
//!
//! Tokens carry no usable expiry, so they are refreshed by age.

// Modules
mod api;
mod credentials;
mod descriptor;
pub(crate) mod parser;
mod probe;

// Re-exports
pub use api::{USAGE_URL, UsageResponse};
pub use credentials::{CodexCodec, codex_auth, codex_auth_path};
pub use descriptor::codex_descriptor;
pub use probe::CodexUsageProbe;
