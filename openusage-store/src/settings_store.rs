//! User preferences store.
//!
//! Manages user settings with persistence and change notification.

use openusage_core::ProviderId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Default supervising timeout for one probe.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a single HTTP request.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default minimum spacing between manual refreshes of one provider.
pub const DEFAULT_MANUAL_REFRESH_COOLDOWN_SECS: u64 = 300;

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Enabled providers, in the order they were enabled.
    pub enabled_providers: Vec<ProviderId>,

    /// Auto-refresh cadence.
    pub refresh_cadence: RefreshCadence,

    /// Supervising timeout for one probe, in seconds.
    pub probe_timeout_secs: u64,

    /// Timeout for a single HTTP request, in seconds.
    pub http_timeout_secs: u64,

    /// Minimum spacing between manual refreshes, in seconds.
    pub manual_refresh_cooldown_secs: u64,

    /// Log level.
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled_providers: ProviderId::all().to_vec(),
            refresh_cadence: RefreshCadence::default(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            manual_refresh_cooldown_secs: DEFAULT_MANUAL_REFRESH_COOLDOWN_SECS,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Supervising timeout for one probe.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    /// Timeout for a single HTTP request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Minimum spacing between manual refreshes.
    pub fn manual_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.manual_refresh_cooldown_secs)
    }
}

/// Refresh cadence options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshCadence {
    /// Manual refresh only.
    Manual,
    /// Every minute.
    OneMinute,
    /// Every two minutes.
    TwoMinutes,
    /// Every five minutes.
    #[default]
    FiveMinutes,
    /// Every fifteen minutes.
    FifteenMinutes,
}

impl RefreshCadence {
    /// Returns the duration, or None for manual.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            RefreshCadence::Manual => None,
            RefreshCadence::OneMinute => Some(Duration::from_secs(60)),
            RefreshCadence::TwoMinutes => Some(Duration::from_secs(120)),
            RefreshCadence::FiveMinutes => Some(Duration::from_secs(300)),
            RefreshCadence::FifteenMinutes => Some(Duration::from_secs(900)),
        }
    }

    /// All available cadences.
    pub fn all() -> &'static [RefreshCadence] {
        &[
            RefreshCadence::Manual,
            RefreshCadence::OneMinute,
            RefreshCadence::TwoMinutes,
            RefreshCadence::FiveMinutes,
            RefreshCadence::FifteenMinutes,
        ]
    }

    /// Parses `manual` or a minute count (`1`, `2`, `5`, `15`, `5m`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "manual" || s == "off" {
            return Some(RefreshCadence::Manual);
        }
        match s.trim_end_matches('m') {
            "1" => Some(RefreshCadence::OneMinute),
            "2" => Some(RefreshCadence::TwoMinutes),
            "5" => Some(RefreshCadence::FiveMinutes),
            "15" => Some(RefreshCadence::FifteenMinutes),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefreshCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshCadence::Manual => write!(f, "Manual"),
            RefreshCadence::OneMinute => write!(f, "1 minute"),
            RefreshCadence::TwoMinutes => write!(f, "2 minutes"),
            RefreshCadence::FiveMinutes => write!(f, "5 minutes"),
            RefreshCadence::FifteenMinutes => write!(f, "15 minutes"),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Informational.
    Info,
    /// Debug output.
    Debug,
    /// Everything.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Settings store with persistence and change notifications.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
}

impl SettingsStore {
    /// Creates a store with default settings, saved to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    /// Creates a store holding `settings`.
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
        }
    }

    /// Loads settings from the default path.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from `path`. A missing or corrupt file yields
    /// defaults.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = match load_json::<Settings>(&path).await {
            Ok(settings) => {
                info!(path = %path.display(), "Loaded settings");
                settings
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        };
        Ok(Self::with_settings(path, settings))
    }

    /// Settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings with a closure and notifies subscribers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        {
            let mut settings = self.settings.write().await;
            f(&mut settings);
        }
        self.notify.send_modify(|v| *v += 1);
    }

    /// Saves settings to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await.clone();
        save_json(&self.path, &settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Subscribes to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    // ========================================================================
    // Convenience Methods
    // ========================================================================

    /// Checks if a provider is enabled.
    pub async fn is_provider_enabled(&self, provider: ProviderId) -> bool {
        self.settings
            .read()
            .await
            .enabled_providers
            .contains(&provider)
    }

    /// Enables or disables a provider. Returns whether anything changed.
    pub async fn set_provider_enabled(&self, provider: ProviderId, enabled: bool) -> bool {
        if self.is_provider_enabled(provider).await == enabled {
            return false;
        }
        self.update(|s| {
            if enabled {
                s.enabled_providers.push(provider);
            } else {
                s.enabled_providers.retain(|p| *p != provider);
            }
        })
        .await;
        info!(provider = %provider, enabled, "Provider enabled state changed");
        true
    }

    /// Gets enabled providers.
    pub async fn enabled_providers(&self) -> Vec<ProviderId> {
        self.settings.read().await.enabled_providers.clone()
    }

    /// Gets the refresh cadence.
    pub async fn refresh_cadence(&self) -> RefreshCadence {
        self.settings.read().await.refresh_cadence
    }

    /// Sets the refresh cadence.
    pub async fn set_refresh_cadence(&self, cadence: RefreshCadence) {
        self.update(|s| s.refresh_cadence = cadence).await;
    }

    /// Gets the supervising probe timeout.
    pub async fn probe_timeout(&self) -> Duration {
        self.settings.read().await.probe_timeout()
    }

    /// Gets the manual refresh cooldown.
    pub async fn manual_refresh_cooldown(&self) -> Duration {
        self.settings.read().await.manual_refresh_cooldown()
    }
}

// ============================================================================
// Tests
// ============================================================================
