//! Provider identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// Provider Id
// ============================================================================

/// Supported providers.
///
/// The declaration order is the default display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Anthropic Claude (Claude Code subscription)
    Claude,
    /// OpenAI Codex CLI
    Codex,
    /// GitHub Copilot
    Copilot,
    /// Cursor IDE
    Cursor,
}

impl ProviderId {
    /// Returns the display name for this provider.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Copilot => "Copilot",
            Self::Cursor => "Cursor",
        }
    }

    /// Returns all providers in display order.
    pub fn all() -> &'static [ProviderId] {
        &[Self::Claude, Self::Codex, Self::Copilot, Self::Cursor]
    }

    /// Returns the CLI name for this provider (lowercase, no spaces).
    ///
    /// Also used as the provider's storage key.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Copilot => "copilot",
            Self::Cursor => "cursor",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|p| p.cli_name() == wanted)
            .ok_or_else(|| CoreError::UnknownProvider(s.to_string()))
    }
}
