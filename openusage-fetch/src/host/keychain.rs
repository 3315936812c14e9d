//! Secure credential storage using the system keychain.
//!
//! This module provides access to the system's secure credential storage:
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! Entries are addressed by the full service name. Entries owned by this
//! application use [`owned_service`]; entries written by provider tooling are
//! read under their own names.

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::KeychainError;

/// Service name prefix for entries owned by `OpenUsage`.
const SERVICE_PREFIX: &str = "OpenUsage";

/// Builds the service name of an entry owned by `OpenUsage`.
pub fn owned_service(provider: &str) -> String {
    format!("{SERVICE_PREFIX}-{provider}")
}

/// The login name most tools use as the keychain account.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

// ============================================================================
// Keychain API Trait
// ============================================================================

/// API for secure credential storage.
#[async_trait]
pub trait KeychainApi: Send + Sync {
    /// Get a secret.
    ///
    /// # Returns
    /// * `Ok(Some(secret))` - Entry found
    /// * `Ok(None)` - Entry not found
    /// * `Err(e)` - Error accessing keychain
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError>;

    /// Create or overwrite a secret.
    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError>;

    /// Delete a secret. Deleting a missing entry is not an error.
    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError>;
}

// ============================================================================
// System Keychain Implementation
// ============================================================================

/// Implementation using the system keychain through the `keyring` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKeychain;

impl SystemKeychain {
    /// Creates a new system keychain instance.
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(service, account).map_err(|e| KeychainError::Platform(e.to_string()))
    }
}

#[async_trait]
impl KeychainApi for SystemKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        let entry = Self::entry(service, account)?;

        match entry.get_password() {
            Ok(secret) if secret.trim().is_empty() => {
                debug!(service = %service, "Keychain entry is empty");
                Ok(None)
            }
            Ok(secret) => {
                debug!(service = %service, "Keychain entry found");
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service = %service, "Keychain entry not found");
                Ok(None)
            }
            Err(e) => {
                warn!(service = %service, error = %e, "Failed to read keychain entry");
                Err(e.into())
            }
        }
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        let entry = Self::entry(service, account)?;

        entry.set_password(secret).map_err(|e| {
            warn!(service = %service, error = %e, "Failed to write keychain entry");
            KeychainError::from(e)
        })?;

        debug!(service = %service, "Keychain entry stored");
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        let entry = Self::entry(service, account)?;

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(service = %service, "Keychain entry deleted");
                Ok(())
            }
            Err(e) => {
                warn!(service = %service, error = %e, "Failed to delete keychain entry");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_service_name() {
        assert_eq!(owned_service("copilot"), "OpenUsage-copilot");
    }

    // Actual keychain access needs a platform session and is not exercised
    // in unit tests; see `testing::MemoryKeychain`.
}
