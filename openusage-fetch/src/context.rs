//! Probe context providing access to host APIs.
//!
//! The context is passed to every probe and to the auth machinery. It is
//! the only way they reach the clock, the network, the keychain, the
//! filesystem and local databases, so tests swap any of them for doubles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use openusage_core::{Clock, ProviderId, SystemClock};

use crate::error::HttpError;
use crate::host::http::DEFAULT_TIMEOUT;
use crate::host::{FileSystem, HttpApi, HttpClient, KeychainApi, SqliteClient, SystemKeychain};
use crate::token::TokenManager;

// ============================================================================
// Probe Settings
// ============================================================================

/// Settings for probe operations.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Root of per-provider state (device flow, owned credential files).
    pub data_dir: PathBuf,
    /// Default HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            http_timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ============================================================================
// Probe Context
// ============================================================================

/// Context provided to probes, giving access to host APIs.
pub struct ProbeContext {
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// HTTP client.
    pub http: Arc<dyn HttpApi>,
    /// Secure credential storage.
    pub keychain: Arc<dyn KeychainApi>,
    /// Filesystem access.
    pub files: FileSystem,
    /// Local database access.
    pub sqlite: SqliteClient,
    /// Process-wide refresh coordinator.
    pub tokens: Arc<TokenManager>,
    /// Probe settings.
    pub settings: ProbeSettings,
}

impl ProbeContext {
    /// Creates a builder for customizing the context.
    pub fn builder() -> ProbeContextBuilder {
        ProbeContextBuilder::new()
    }

    /// Milliseconds since the Unix epoch.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// `<data_dir>/providers/<id>`.
    pub fn provider_data_dir(&self, provider: ProviderId) -> PathBuf {
        self.settings
            .data_dir
            .join("providers")
            .join(provider.cli_name())
    }
}

impl std::fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Probe Context Builder
// ============================================================================

/// Builder for creating a customized [`ProbeContext`].
#[derive(Default)]
pub struct ProbeContextBuilder {
    clock: Option<Arc<dyn Clock>>,
    http: Option<Arc<dyn HttpApi>>,
    keychain: Option<Arc<dyn KeychainApi>>,
    files: Option<FileSystem>,
    tokens: Option<Arc<TokenManager>>,
    settings: ProbeSettings,
}

impl ProbeContextBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn http(mut self, http: Arc<dyn HttpApi>) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the keychain.
    #[must_use]
    pub fn keychain(mut self, keychain: Arc<dyn KeychainApi>) -> Self {
        self.keychain = Some(keychain);
        self
    }

    /// Sets the filesystem.
    #[must_use]
    pub fn files(mut self, files: FileSystem) -> Self {
        self.files = Some(files);
        self
    }

    /// Shares a refresh coordinator with other contexts.
    #[must_use]
    pub fn tokens(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.data_dir = dir.into();
        self
    }

    /// Sets the default HTTP timeout.
    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.settings.http_timeout = timeout;
        self
    }

    /// Builds the context. Fails only if the default HTTP client cannot be
    /// created.
    pub fn build(self) -> Result<ProbeContext, HttpError> {
        let http: Arc<dyn HttpApi> = match self.http {
            Some(http) => http,
            None => Arc::new(HttpClient::with_timeout(self.settings.http_timeout)?),
        };

        Ok(ProbeContext {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            http,
            keychain: self.keychain.unwrap_or_else(|| Arc::new(SystemKeychain::new())),
            files: self.files.unwrap_or_default(),
            sqlite: SqliteClient::new(),
            tokens: self.tokens.unwrap_or_default(),
            settings: self.settings,
        })
    }
}
