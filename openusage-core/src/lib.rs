// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `OpenUsage` Core
//!
//! Core types, models, and traits shared by every `OpenUsage` crate.
//!
//! ## Key Types
//!
//! ### Provider Types
//! - [`ProviderId`] - Enum of all supported providers
//!
//! ### Credentials
//! - [`Credential`] - A provider-scoped OAuth credential
//! - [`CredentialSource`] - Which backend a credential was loaded from
//!
//! ### Probe Output
//! - [`ProbeOutput`] - Plan label plus metric lines produced by a probe
//! - [`MetricLine`] - Text, progress, or badge line
//! - [`ProbeResult`] / [`ProbeOutcome`] - Per-provider result of a probe
//! - [`ErrorKind`] - Closed taxonomy of probe failures
//!
//! ### Time
//! - [`Clock`] - Injectable wall clock

pub mod error;
pub mod models;
pub mod traits;

pub use error::CoreError;

pub use models::{
    // Provider types
    ProviderId,
    // Credentials
    Credential,
    CredentialSource,
    // Probe output
    ErrorKind,
    MetricLine,
    ProbeOutcome,
    ProbeOutput,
    ProbeResult,
    ProgressFormat,
    // Formatting helpers
    plan_label,
    reset_in,
};

pub use traits::{Clock, SystemClock};
