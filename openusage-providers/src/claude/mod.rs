//! Claude (Anthropic) provider implementation.
//!
//! Uses the OAuth tokens written by the Claude CLI to call the Anthropic
//! usage API.
//!
//! ## OAuth Credentials
//!
//! Credentials are read from, in order:
//! - File: `~/.claude/.credentials.json`
//! - Keychain: service="Claude Code-credentials"
//!
//! Format:
//! ```json
//! {
//!   "claudeAiOauth": {
//!     "accessToken": "...",
//!     "refreshToken": "...",
//!     "expiresAt": 1735000000000,
//!     "scopes": ["user:inference", "user:profile"],
//!     "subscriptionType": "max"
//!   }
//! }
//! ```
//!
//! Refreshed tokens are written back where they were found.

// Modules
mod api;
mod credentials;
mod descriptor;
pub(crate) mod parser;
mod probe;

// Re-exports
pub use api::{USAGE_URL, UsageResponse, UsageWindow};
pub use credentials::{ClaudeCodec, claude_auth};
pub use descriptor::claude_descriptor;
pub use probe::ClaudeUsageProbe;
