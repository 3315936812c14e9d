//! Domain models for `OpenUsage`.
//!
//! ## Submodules
//!
//! - [`provider`] - Provider identifiers
//! - [`credential`] - OAuth credentials and their sources
//! - [`probe`] - Probe output lines, outcomes and the error taxonomy

mod credential;
mod probe;
mod provider;

pub use credential::{Credential, CredentialSource};
pub use probe::{
    ErrorKind, MetricLine, ProbeOutcome, ProbeOutput, ProbeResult, ProgressFormat, plan_label,
    reset_in,
};
pub use provider::ProviderId;
