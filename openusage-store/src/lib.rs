// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `OpenUsage` Store
//!
//! State management and probe orchestration for `OpenUsage`.
//!
//! This crate provides:
//!
//! - **`SettingsStore`**: User preferences with persistence
//! - **`UsageStore`**: Per-provider display state, reconciled against the
//!   active batch
//! - **`Orchestrator`**: Concurrent probe batches with supervision, manual
//!   refresh cooldown and auto refresh
//! - **Persistence**: File I/O helpers for JSON data
//!
//! ## Usage
//!
//! ```ignore
//! use openusage_store::{BatchRequest, BatchTrigger, Orchestrator, SettingsStore, UsageStore};
//!
//! let settings = Arc::new(SettingsStore::load_default().await?);
//! let orchestrator = Orchestrator::new(ctx, catalog, settings, Arc::new(UsageStore::new()));
//!
//! let mut events = orchestrator.subscribe();
//! orchestrator.start_batch(BatchRequest::enabled(BatchTrigger::Startup)).await;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod error;
pub mod orchestrator;
pub mod persistence;
pub mod settings_store;
pub mod usage_store;

pub use error::StoreError;
pub use orchestrator::{BatchRequest, BatchStarted, Orchestrator, ProbeEvent};
pub use persistence::{
    default_config_dir, default_data_dir, default_log_dir, default_settings_path, ensure_dir,
    load_json, load_json_or_default, log_path, save_json, settings_path,
};
pub use settings_store::{LogLevel, RefreshCadence, Settings, SettingsStore};
pub use usage_store::{BatchTrigger, ProviderError, ProviderState, UsageStore};

#[cfg(test)]
mod persistence_tests;
