//! Probe seams.
//!
//! A [`UsageProbe`] fetches one provider's usage. The orchestrator only
//! sees probes through a [`ProbeCatalog`], so tests can hand it scripted
//! probes instead of real ones.

use std::sync::Arc;

use async_trait::async_trait;
use openusage_core::{ProbeOutput, ProviderId};

use crate::classify::ProbeError;
use crate::context::ProbeContext;

/// Fetches usage for one provider.
#[async_trait]
pub trait UsageProbe: Send + Sync {
    /// Provider this probe serves.
    fn provider(&self) -> ProviderId;

    /// Runs the probe.
    async fn probe(&self, ctx: &ProbeContext) -> Result<ProbeOutput, ProbeError>;
}

/// Lookup of probes by provider.
pub trait ProbeCatalog: Send + Sync {
    /// The probe for `id`, if the provider is known.
    fn probe(&self, id: ProviderId) -> Option<Arc<dyn UsageProbe>>;

    /// Every provider in display order.
    fn ids(&self) -> Vec<ProviderId>;
}
