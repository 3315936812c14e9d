// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `OpenUsage` Fetch
//!
//! Host APIs, credential resolution and the token lifecycle used by every
//! `OpenUsage` provider probe.
//!
//! ## Host APIs
//!
//! The [`host`] module wraps everything a probe touches outside the process:
//!
//! - [`host::http`] - HTTP client with timeouts, no redirects and redacted logging
//! - [`host::keychain`] - Secure credential storage (system keychain)
//! - [`host::files`] - Home-relative file access with atomic writes
//! - [`host::sqlite`] - Read access to local `SQLite` state databases
//!
//! ## Authentication
//!
//! - [`credential::CredentialStore`] - Ordered credential backends per provider
//! - [`token::TokenManager`] - Single-flight token refresh
//! - [`device_flow::DeviceFlow`] - Stepwise device authorization
//! - [`session::AuthSession`] - Credential plus refresh budget for one probe run
//!
//! ## Probes
//!
//! - [`probe::UsageProbe`] - Fetches one provider's usage
//! - [`classify::ProbeError`] - Every probe failure, mapped to an error kind
//! - [`context::ProbeContext`] - Injected host APIs
//!
//! ## Example
//!
//! ```ignore
//! use openusage_fetch::{AuthSession, ProbeContext};
//!
//! let ctx = ProbeContext::builder().data_dir(data_dir).build()?;
//! let mut session = AuthSession::open(&ctx, &auth).await?;
//! let response = session
//!     .send(|cred| HttpRequest::get(USAGE_URL).bearer(cred.bearer().unwrap_or_default()))
//!     .await?;
//! ```

// Core modules
pub mod classify;
pub mod context;
pub mod credential;
pub mod device_flow;
pub mod error;
pub mod host;
pub mod probe;
pub mod session;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root

// Errors
pub use classify::{ProbeError, ensure_success};
pub use error::{BackendError, FileError, HttpError, KeychainError, SqliteError};

// Host APIs
pub use host::{
    FileSystem, HttpApi, HttpClient, HttpRequest, HttpResponse, KeychainApi, Method, SqliteClient,
    SystemKeychain,
};

// Authentication
pub use credential::{
    CredentialBackend, CredentialCodec, CredentialStore, FileBackend, FileFormat, FileLocation,
    KeychainAccount, KeychainBackend, ResolvedCredential, SqliteItemBackend,
};
pub use device_flow::{DeviceFlow, DeviceFlowConfig, DeviceFlowState, PendingAuthorization};
pub use session::{AuthSession, ProviderAuth};
pub use token::{
    OAuthRefresher, RefreshOutcome, RefreshPhase, RefreshRejected, RefreshTrigger, TokenGrant,
    TokenManager, TokenPolicy, TokenRefresher,
};

// Probes
pub use context::{ProbeContext, ProbeContextBuilder, ProbeSettings};
pub use probe::{ProbeCatalog, UsageProbe};
