//! Probe batch orchestration.
//!
//! A batch probes a set of providers concurrently, one supervised tokio task
//! each. Every task ends in exactly one [`ProbeEvent::Result`]; the task that
//! finishes last emits [`ProbeEvent::BatchComplete`]. Starting a batch
//! supersedes the previous one; its late results are dropped by the
//! [`UsageStore`] batch-id check.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use openusage_core::{ErrorKind, ProbeOutcome, ProbeResult, ProviderId};
use openusage_fetch::{ProbeCatalog, ProbeContext, UsageProbe};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::settings_store::SettingsStore;
use crate::usage_store::{BatchTrigger, UsageStore};

const EVENT_CAPACITY: usize = 256;

// ============================================================================
// Events
// ============================================================================

/// Events broadcast while batches run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeEvent {
    /// One provider finished.
    Result {
        /// Batch the probe belonged to.
        batch_id: String,
        /// The provider's result.
        result: ProbeResult,
    },
    /// Every provider of the batch finished.
    BatchComplete {
        /// The finished batch.
        batch_id: String,
    },
}

/// Parameters of [`Orchestrator::start_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Caller-chosen id; blank or missing ids get a fresh UUID.
    pub batch_id: Option<String>,
    /// Providers to probe; `None` means every enabled provider.
    pub provider_ids: Option<Vec<ProviderId>>,
    /// What started the batch.
    pub trigger: BatchTrigger,
}

impl BatchRequest {
    /// Every enabled provider.
    pub fn enabled(trigger: BatchTrigger) -> Self {
        Self {
            trigger,
            ..Self::default()
        }
    }

    /// An explicit provider list.
    pub fn providers(ids: Vec<ProviderId>, trigger: BatchTrigger) -> Self {
        Self {
            provider_ids: Some(ids),
            trigger,
            ..Self::default()
        }
    }

    /// Uses a caller-chosen batch id.
    #[must_use]
    pub fn with_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// Identity of a started batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStarted {
    /// Batch id.
    pub batch_id: String,
    /// Providers being probed, de-duplicated, in request order.
    pub provider_ids: Vec<ProviderId>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs probe batches and keeps the [`UsageStore`] in sync.
pub struct Orchestrator {
    ctx: Arc<ProbeContext>,
    catalog: Arc<dyn ProbeCatalog>,
    settings: Arc<SettingsStore>,
    usage: Arc<UsageStore>,
    events: broadcast::Sender<ProbeEvent>,
}

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new(
        ctx: Arc<ProbeContext>,
        catalog: Arc<dyn ProbeCatalog>,
        settings: Arc<SettingsStore>,
        usage: Arc<UsageStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ctx,
            catalog,
            settings,
            usage,
            events,
        }
    }

    /// Usage state.
    pub fn usage(&self) -> &Arc<UsageStore> {
        &self.usage
    }

    /// Settings.
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Probe context shared by every batch.
    pub fn context(&self) -> &Arc<ProbeContext> {
        &self.ctx
    }

    /// Subscribes to probe events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Starts a batch and returns without waiting for it.
    ///
    /// Every selected provider is marked loading before any probe runs. An
    /// empty selection completes immediately.
    #[instrument(skip(self, request), fields(trigger = ?request.trigger))]
    pub async fn start_batch(&self, request: BatchRequest) -> BatchStarted {
        let batch_id = request
            .batch_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let provider_ids = self.select(request.provider_ids).await;
        info!(batch_id = %batch_id, providers = ?provider_ids, "Starting probe batch");

        self.usage
            .begin_batch(&batch_id, &provider_ids, request.trigger)
            .await;

        let probes: Vec<Arc<dyn UsageProbe>> = provider_ids
            .iter()
            .filter_map(|id| self.catalog.probe(*id))
            .collect();
        if probes.is_empty() {
            self.complete(&batch_id).await;
            return BatchStarted {
                batch_id,
                provider_ids,
            };
        }

        let timeout = self.settings.probe_timeout().await;
        let remaining = Arc::new(AtomicUsize::new(probes.len()));
        for probe in probes {
            let ctx = Arc::clone(&self.ctx);
            let usage = Arc::clone(&self.usage);
            let events = self.events.clone();
            let remaining = Arc::clone(&remaining);
            let batch_id = batch_id.clone();

            tokio::spawn(async move {
                let result = supervise(Arc::clone(&ctx), probe, timeout).await;
                usage.apply_result(&batch_id, &result, ctx.now_ms()).await;
                let _ = events.send(ProbeEvent::Result {
                    batch_id: batch_id.clone(),
                    result,
                });

                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    usage.apply_complete(&batch_id).await;
                    let _ = events.send(ProbeEvent::BatchComplete { batch_id });
                }
            });
        }

        BatchStarted {
            batch_id,
            provider_ids,
        }
    }

    /// Starts a batch and waits for all of its results, returned in
    /// provider order.
    pub async fn run_batch(&self, request: BatchRequest) -> (BatchStarted, Vec<ProbeResult>) {
        let mut events = self.subscribe();
        let started = self.start_batch(request).await;
        let mut results = Vec::with_capacity(started.provider_ids.len());

        loop {
            match events.recv().await {
                Ok(ProbeEvent::Result { batch_id, result }) if batch_id == started.batch_id => {
                    results.push(result);
                }
                Ok(ProbeEvent::BatchComplete { batch_id }) if batch_id == started.batch_id => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Probe event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        results.sort_by_key(|r| {
            started
                .provider_ids
                .iter()
                .position(|id| *id == r.provider_id)
        });
        (started, results)
    }

    /// Retries one provider on user request, honoring the manual cooldown.
    ///
    /// Returns `None` when the last successful manual refresh is too recent.
    pub async fn manual_refresh(&self, provider: ProviderId) -> Option<BatchStarted> {
        let cooldown = self.settings.manual_refresh_cooldown().await;
        if let Some(last) = self.usage.last_manual_refresh_at(provider).await {
            let elapsed = self.ctx.now_ms().saturating_sub(last);
            if elapsed < duration_ms(cooldown) {
                debug!(provider = %provider, elapsed_ms = elapsed, "Manual refresh in cooldown");
                return None;
            }
        }
        Some(
            self.start_batch(BatchRequest::providers(vec![provider], BatchTrigger::Manual))
                .await,
        )
    }

    /// Enables or disables a provider and persists the settings. Newly
    /// enabled providers are probed right away.
    pub async fn set_provider_enabled(
        &self,
        provider: ProviderId,
        enabled: bool,
    ) -> Result<Option<BatchStarted>, StoreError> {
        if self.catalog.probe(provider).is_none() {
            return Err(StoreError::UnknownProvider(provider.to_string()));
        }
        let changed = self.settings.set_provider_enabled(provider, enabled).await;
        if changed {
            self.settings.save().await?;
        }
        if !enabled {
            self.usage.remove(provider).await;
            return Ok(None);
        }
        if !changed {
            return Ok(None);
        }
        Ok(Some(
            self.start_batch(BatchRequest::providers(vec![provider], BatchTrigger::Startup))
                .await,
        ))
    }

    /// Starts timer-driven batches at the configured cadence. Never returns
    /// while settings are alive; run it in its own task and drop that task
    /// to stop. Cadence changes restart the timer.
    pub async fn run_auto_refresh(&self) {
        let mut changes = self.settings.subscribe();
        loop {
            let cadence = self.settings.refresh_cadence().await;
            if let Some(period) = cadence.as_duration() {
                tokio::select! {
                    () = tokio::time::sleep(period) => {
                        self.start_batch(BatchRequest::enabled(BatchTrigger::Timer)).await;
                    }
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            } else {
                debug!("Auto refresh is manual, waiting for settings change");
                if changes.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    async fn select(&self, requested: Option<Vec<ProviderId>>) -> Vec<ProviderId> {
        let known = self.catalog.ids();
        match requested {
            None => {
                let enabled = self.settings.enabled_providers().await;
                known.into_iter().filter(|id| enabled.contains(id)).collect()
            }
            Some(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    if !known.contains(&id) {
                        warn!(provider = %id, "Dropping unknown provider from batch");
                    } else if !selected.contains(&id) {
                        selected.push(id);
                    }
                }
                selected
            }
        }
    }

    async fn complete(&self, batch_id: &str) {
        self.usage.apply_complete(batch_id).await;
        let _ = self.events.send(ProbeEvent::BatchComplete {
            batch_id: batch_id.to_string(),
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Supervision
// ============================================================================

/// Runs one probe in its own task under `timeout`. Panics and timeouts turn
/// into error outcomes.
async fn supervise(
    ctx: Arc<ProbeContext>,
    probe: Arc<dyn UsageProbe>,
    timeout: Duration,
) -> ProbeResult {
    let provider = probe.provider();
    let mut task = tokio::spawn(async move { probe.probe(&ctx).await });

    let outcome = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(output))) => {
            info!(provider = %provider, lines = output.lines.len(), "Probe completed");
            ProbeOutcome::Success(output)
        }
        Ok(Ok(Err(e))) => {
            warn!(provider = %provider, kind = %e.kind(), error = %e, "Probe failed");
            e.into_outcome()
        }
        Ok(Err(join_error)) => {
            error!(provider = %provider, error = %join_error, "Probe panicked");
            ProbeOutcome::Error {
                kind: ErrorKind::MalformedResponse,
                message: "Probe failed unexpectedly. Try again.".into(),
            }
        }
        Err(_) => {
            task.abort();
            warn!(provider = %provider, timeout_secs = timeout.as_secs(), "Probe timed out");
            ProbeOutcome::Error {
                kind: ErrorKind::Network,
                message: "Timed out waiting for the provider.".into(),
            }
        }
    };
    ProbeResult {
        provider_id: provider,
        outcome,
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
