//! Provider usage state.
//!
//! Holds what the UI shows for each provider and reconciles probe events
//! against the single active batch. Results from superseded batches are
//! dropped here, so nothing else needs to cancel in-flight probes.

use openusage_core::{ErrorKind, ProbeOutcome, ProbeOutput, ProbeResult, ProviderId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

// ============================================================================
// Provider State
// ============================================================================

/// A failed probe as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Short actionable message.
    pub message: String,
}

/// Display state of one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderState {
    /// Last successful output of the current batch.
    pub data: Option<ProbeOutput>,
    /// A probe is in flight.
    pub loading: bool,
    /// Last failure.
    pub error: Option<ProviderError>,
    /// When a manual refresh last succeeded (ms since epoch).
    pub last_manual_refresh_at_ms: Option<i64>,
}

/// What started a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTrigger {
    /// User asked for a retry or refresh.
    Manual,
    /// Auto-refresh timer.
    Timer,
    /// Startup, or a provider was just enabled.
    #[default]
    Startup,
}

#[derive(Debug, Clone)]
struct ActiveBatch {
    id: String,
    trigger: BatchTrigger,
}

#[derive(Default)]
struct UsageStoreInner {
    providers: BTreeMap<ProviderId, ProviderState>,
    active: Option<ActiveBatch>,
}

// ============================================================================
// Usage Store
// ============================================================================

/// Main state store for provider usage data.
///
/// Observable via a watch channel carrying a change counter.
pub struct UsageStore {
    inner: Arc<RwLock<UsageStoreInner>>,
    notify: watch::Sender<u64>,
}

impl Default for UsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(UsageStoreInner::default())),
            notify,
        }
    }

    // ========================================================================
    // Batch Reconciliation
    // ========================================================================

    /// Makes `batch_id` the only active batch and marks `providers` as
    /// loading with their errors cleared.
    pub async fn begin_batch(&self, batch_id: &str, providers: &[ProviderId], trigger: BatchTrigger) {
        {
            let mut inner = self.inner.write().await;
            if let Some(previous) = &inner.active {
                debug!(superseded = %previous.id, batch_id, "Batch superseded");
            }
            inner.active = Some(ActiveBatch {
                id: batch_id.to_string(),
                trigger,
            });
            for provider in providers {
                let state = inner.providers.entry(*provider).or_default();
                state.loading = true;
                state.error = None;
            }
        }
        self.notify_change();
    }

    /// Applies a probe result if it belongs to the active batch.
    ///
    /// Returns `false` (and changes nothing) for stale batches.
    pub async fn apply_result(&self, batch_id: &str, result: &ProbeResult, now_ms: i64) -> bool {
        {
            let mut inner = self.inner.write().await;
            let Some(trigger) = inner
                .active
                .as_ref()
                .filter(|active| active.id == batch_id)
                .map(|active| active.trigger)
            else {
                debug!(batch_id, provider = %result.provider_id, "Ignoring result from stale batch");
                return false;
            };

            let state = inner.providers.entry(result.provider_id).or_default();
            state.loading = false;
            match &result.outcome {
                ProbeOutcome::Success(output) => {
                    state.data = Some(output.clone());
                    state.error = None;
                    if trigger == BatchTrigger::Manual {
                        state.last_manual_refresh_at_ms = Some(now_ms);
                    }
                }
                ProbeOutcome::Error { kind, message } => {
                    state.data = None;
                    state.error = Some(ProviderError {
                        kind: *kind,
                        message: message.clone(),
                    });
                }
            }
        }
        self.notify_change();
        true
    }

    /// Clears the active batch if it is `batch_id`.
    pub async fn apply_complete(&self, batch_id: &str) -> bool {
        {
            let mut inner = self.inner.write().await;
            if inner.active.as_ref().map(|a| a.id.as_str()) != Some(batch_id) {
                debug!(batch_id, "Ignoring completion of stale batch");
                return false;
            }
            inner.active = None;
            for state in inner.providers.values_mut() {
                state.loading = false;
            }
        }
        info!(batch_id, "Batch complete");
        self.notify_change();
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Id of the active batch.
    pub async fn active_batch(&self) -> Option<String> {
        self.inner.read().await.active.as_ref().map(|a| a.id.clone())
    }

    /// State of one provider.
    pub async fn get(&self, provider: ProviderId) -> Option<ProviderState> {
        self.inner.read().await.providers.get(&provider).cloned()
    }

    /// States of every provider seen so far, in display order.
    pub async fn all(&self) -> Vec<(ProviderId, ProviderState)> {
        self.inner
            .read()
            .await
            .providers
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }

    /// When a manual refresh of `provider` last succeeded.
    pub async fn last_manual_refresh_at(&self, provider: ProviderId) -> Option<i64> {
        self.inner
            .read()
            .await
            .providers
            .get(&provider)
            .and_then(|s| s.last_manual_refresh_at_ms)
    }

    /// Forgets a provider, e.g. after it was disabled.
    pub async fn remove(&self, provider: ProviderId) {
        self.inner.write().await.providers.remove(&provider);
        self.notify_change();
    }

    // ========================================================================
    // Observable
    // ========================================================================

    /// Subscribes to store changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn notify_change(&self) {
        self.notify.send_modify(|version| *version += 1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn success(provider_id: ProviderId) -> ProbeResult {
        ProbeResult {
            provider_id,
            outcome: ProbeOutcome::Success(ProbeOutput::default()),
        }
    }

    #[tokio::test]
    async fn test_begin_batch_marks_loading() {
        let store = UsageStore::new();
        store
            .begin_batch("b1", &[ProviderId::Claude], BatchTrigger::Startup)
            .await;

        let state = store.get(ProviderId::Claude).await.unwrap();
        assert!(state.loading);
        assert!(state.error.is_none());
        assert_eq!(store.active_batch().await.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_stale_result_is_ignored() {
        let store = UsageStore::new();
        store
            .begin_batch("b1", &[ProviderId::Claude], BatchTrigger::Startup)
            .await;
        store
            .begin_batch("b2", &[ProviderId::Claude], BatchTrigger::Startup)
            .await;
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert!(!store.apply_result("b1", &success(ProviderId::Claude), 0).await);
        assert!(!rx.has_changed().unwrap());
        let state = store.get(ProviderId::Claude).await.unwrap();
        assert!(state.loading);
        assert!(state.data.is_none());

        assert!(!store.apply_complete("b1").await);
        assert_eq!(store.active_batch().await.as_deref(), Some("b2"));
    }

    #[tokio::test]
    async fn test_error_result_replaces_data() {
        let store = UsageStore::new();
        store
            .begin_batch("b1", &[ProviderId::Codex], BatchTrigger::Timer)
            .await;
        store.apply_result("b1", &success(ProviderId::Codex), 0).await;
        store
            .begin_batch("b2", &[ProviderId::Codex], BatchTrigger::Timer)
            .await;
        let failed = ProbeResult {
            provider_id: ProviderId::Codex,
            outcome: ProbeOutcome::error(ErrorKind::Network),
        };
        assert!(store.apply_result("b2", &failed, 0).await);

        let state = store.get(ProviderId::Codex).await.unwrap();
        assert!(!state.loading);
        assert!(state.data.is_none());
        assert_eq!(state.error.unwrap().kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_manual_success_records_timestamp() {
        let store = UsageStore::new();
        store
            .begin_batch("timer", &[ProviderId::Cursor], BatchTrigger::Timer)
            .await;
        store.apply_result("timer", &success(ProviderId::Cursor), 10).await;
        assert_eq!(store.last_manual_refresh_at(ProviderId::Cursor).await, None);

        store
            .begin_batch("manual", &[ProviderId::Cursor], BatchTrigger::Manual)
            .await;
        store.apply_result("manual", &success(ProviderId::Cursor), 20).await;
        assert_eq!(
            store.last_manual_refresh_at(ProviderId::Cursor).await,
            Some(20)
        );
        assert!(store.apply_complete("manual").await);
        assert!(store.active_batch().await.is_none());
    }
}
