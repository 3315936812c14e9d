//! GitHub Copilot provider implementation.
//!
//! Copilot tokens are plain GitHub OAuth tokens without expiry. They are
//! looked up in, in order:
//!
//! 1. The app's own keychain entry (`OpenUsage-copilot`)
//! 2. The GitHub CLI keychain entry (`gh:github.com`)
//! 3. The GitHub CLI config (`~/.config/gh/hosts.yml`)
//! 4. The app's own file (`<data_dir>/providers/copilot/auth.json`)
//!
//! When none holds a token, the GitHub device flow signs the user in. A
//! token still rejected after one reload is dropped from the app's store so
//! the next probe falls through to the other sources.

// Modules
mod api;
mod credentials;
mod descriptor;
pub(crate) mod parser;
mod probe;

// Re-exports
pub use api::{USAGE_URL, UserResponse};
pub use credentials::{CopilotCodec, copilot_auth, github_device_flow};
pub use descriptor::copilot_descriptor;
pub use probe::CopilotUsageProbe;
