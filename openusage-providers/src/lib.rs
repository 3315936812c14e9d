// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `OpenUsage` Providers
//!
//! Usage probes for each supported AI coding assistant.
//!
//! Each provider module includes:
//!
//! - **Descriptor**: Static metadata and the hosts its probe may contact
//! - **Credentials**: Where the provider's tooling keeps its tokens and how
//!   they refresh
//! - **Parser**: Response parsing into metric lines
//! - **Probe**: The [`UsageProbe`](openusage_fetch::UsageProbe) implementation
//!
//! ## Supported Providers
//!
//! | Provider | Credentials | Refresh | Device flow |
//! |----------|-------------|---------|-------------|
//! | Claude | `~/.claude/.credentials.json`, keychain | expiry | no |
//! | Codex | `$CODEX_HOME/auth.json`, keychain | age (8 days) | no |
//! | Copilot | app keychain, `gh` keychain, `hosts.yml` | none | yes |
//! | Cursor | editor `state.vscdb` | JWT expiry | no |
//!
//! ## Usage
//!
//! ```ignore
//! use openusage_core::ProviderId;
//! use openusage_providers::ProviderRegistry;
//!
//! let desc = ProviderRegistry::get(ProviderId::Claude).unwrap();
//! let output = desc.probe().probe(&ctx).await?;
//! ```

pub mod descriptor;
pub mod registry;

// Provider modules (alphabetical)
pub mod claude;
pub mod codex;
pub mod copilot;
pub mod cursor;

// Re-export key types
pub use descriptor::{ProviderDescriptor, ProviderMetadata};
pub use registry::ProviderRegistry;

// Re-export provider descriptors
pub use claude::claude_descriptor;
pub use codex::codex_descriptor;
pub use copilot::copilot_descriptor;
pub use cursor::cursor_descriptor;

// Re-export probes
pub use claude::ClaudeUsageProbe;
pub use codex::CodexUsageProbe;
pub use copilot::CopilotUsageProbe;
pub use cursor::CursorUsageProbe;
