//! JSON output formatting.

use anyhow::Result;
use openusage_core::{MetricLine, ProbeOutcome, ProbeResult, ProviderId};
use openusage_providers::{ProviderDescriptor, ProviderRegistry};
use openusage_store::{ProviderError, ProviderState};
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for a single provider.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutput {
    pub provider: String,
    pub name: String,
    pub status: OutputStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<MetricLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

/// Coarse provider status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Ok,
    Error,
    Loading,
    Empty,
}

/// Provider info output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfoOutput {
    pub id: String,
    pub display_name: String,
    pub primary_label: String,
    pub enabled: bool,
    pub default_enabled: bool,
    pub device_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    pub allowed_hosts: Vec<String>,
}

fn base(provider: ProviderId, status: OutputStatus) -> ProviderOutput {
    ProviderOutput {
        provider: provider.cli_name().to_string(),
        name: ProviderRegistry::get(provider)
            .map_or_else(|| provider.display_name(), ProviderDescriptor::display_name)
            .to_string(),
        status,
        plan: None,
        lines: Vec::new(),
        error: None,
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats batch results.
    pub fn format_results(&self, results: &[ProbeResult]) -> Result<String> {
        let outputs: Vec<ProviderOutput> = results.iter().map(result_to_output).collect();
        self.format(&outputs)
    }

    /// Formats live provider states.
    pub fn format_states(&self, states: &[(ProviderId, ProviderState)]) -> Result<String> {
        let outputs: Vec<ProviderOutput> = states
            .iter()
            .map(|(id, state)| state_to_output(*id, state))
            .collect();
        self.format(&outputs)
    }

    /// Formats provider list.
    pub fn format_providers(
        &self,
        providers: &[ProviderDescriptor],
        enabled: &[ProviderId],
    ) -> Result<String> {
        let outputs: Vec<ProviderInfoOutput> = providers
            .iter()
            .map(|desc| ProviderInfoOutput {
                id: desc.cli_name().to_string(),
                display_name: desc.display_name().to_string(),
                primary_label: desc.metadata.primary_label.to_string(),
                enabled: enabled.contains(&desc.id),
                default_enabled: desc.metadata.default_enabled,
                device_login: desc.device_flow.is_some(),
                dashboard_url: desc.metadata.dashboard_url.map(String::from),
                allowed_hosts: desc.allowed_hosts.iter().map(|h| (*h).to_string()).collect(),
            })
            .collect();
        self.format(&outputs)
    }
}

fn result_to_output(result: &ProbeResult) -> ProviderOutput {
    match &result.outcome {
        ProbeOutcome::Success(output) => ProviderOutput {
            plan: output.plan.clone(),
            lines: output.lines.clone(),
            ..base(result.provider_id, OutputStatus::Ok)
        },
        ProbeOutcome::Error { kind, message } => ProviderOutput {
            error: Some(ProviderError {
                kind: *kind,
                message: message.clone(),
            }),
            ..base(result.provider_id, OutputStatus::Error)
        },
    }
}

fn state_to_output(provider: ProviderId, state: &ProviderState) -> ProviderOutput {
    let status = if state.error.is_some() {
        OutputStatus::Error
    } else if state.loading {
        OutputStatus::Loading
    } else if state.data.is_some() {
        OutputStatus::Ok
    } else {
        OutputStatus::Empty
    };
    ProviderOutput {
        plan: state.data.as_ref().and_then(|d| d.plan.clone()),
        lines: state.data.as_ref().map(|d| d.lines.clone()).unwrap_or_default(),
        error: state.error.clone(),
        ..base(provider, status)
    }
}
