//! Persistence round-trip and edge case tests.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::persistence::{ensure_dir, load_json, load_json_or_default, save_json};
use crate::settings_store::{LogLevel, RefreshCadence, Settings, SettingsStore};
use openusage_core::ProviderId;

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("test.json");

    save_json(&nested_path, &serde_json::json!({"key": "value"}))
        .await
        .unwrap();
    assert!(nested_path.exists());
    assert!(!nested_path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let err = load_json::<Settings>(&file_path).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_corrupt_file_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let settings: Settings = load_json_or_default(&path).await;
    assert_eq!(settings, Settings::default());
}

#[tokio::test]
async fn test_ensure_dir_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let new_dir = temp_dir.path().join("providers").join("copilot");

    ensure_dir(&new_dir).await.unwrap();
    ensure_dir(&new_dir).await.unwrap();
    assert!(new_dir.is_dir());
}

// ============================================================================
// Settings Round-trip
// ============================================================================

#[tokio::test]
async fn test_settings_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let store = SettingsStore::load(path.clone()).await.unwrap();
    store.set_provider_enabled(ProviderId::Claude, false).await;
    store.set_refresh_cadence(RefreshCadence::Manual).await;
    store.update(|s| s.log_level = LogLevel::Debug).await;
    store.save().await.unwrap();

    let reloaded = SettingsStore::load(path).await.unwrap().get().await;
    assert!(!reloaded.enabled_providers.contains(&ProviderId::Claude));
    assert_eq!(reloaded.refresh_cadence, RefreshCadence::Manual);
    assert_eq!(reloaded.log_level, LogLevel::Debug);
}
