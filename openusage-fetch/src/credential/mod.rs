//! Credential resolution over ordered backends.
//!
//! A [`CredentialStore`] walks a provider's backends in priority order and
//! stops at the first one holding a structurally valid credential. Values
//! are never merged across backends. A credential found outside the primary
//! backend can be promoted into it; promotion failures are only logged.

pub mod backend;
pub mod decode;

use std::sync::Arc;

use openusage_core::{Credential, ProviderId};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub use backend::{
    CredentialBackend, FileBackend, FileFormat, FileLocation, KeychainAccount, KeychainBackend,
    SqliteItemBackend,
};
pub use decode::{GO_KEYRING_PREFIX, SecretShape, decode_secret, encode_compact};

use crate::context::ProbeContext;
use crate::error::BackendError;

// ============================================================================
// Codec
// ============================================================================

/// Maps a provider's stored document to a [`Credential`] and back.
pub trait CredentialCodec: Send + Sync {
    /// Extracts a credential; `None` when the document does not hold one.
    fn decode(&self, document: &Value, credential: Credential) -> Option<Credential>;

    /// Produces the document to store, merging into `credential.document`.
    fn encode(&self, credential: &Credential) -> Value;
}

// ============================================================================
// Resolved Credential
// ============================================================================

/// A credential together with the index of the backend it belongs to.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    /// The credential.
    pub credential: Credential,
    /// Index into the store's backends where updates are written.
    pub origin: usize,
}

// ============================================================================
// Credential Store
// ============================================================================

/// Ordered backend chain plus codec for one provider.
#[derive(Clone)]
pub struct CredentialStore {
    provider: ProviderId,
    backends: Vec<Arc<dyn CredentialBackend>>,
    codec: Arc<dyn CredentialCodec>,
    promote: bool,
}

impl CredentialStore {
    /// Creates a store. The first backend is the primary one.
    pub fn new(provider: ProviderId, codec: Arc<dyn CredentialCodec>) -> Self {
        Self {
            provider,
            backends: Vec::new(),
            codec,
            promote: true,
        }
    }

    /// Appends a backend (lowest priority so far).
    #[must_use]
    pub fn backend(mut self, backend: impl CredentialBackend + 'static) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    /// Do not copy credentials found in later backends into the primary one.
    ///
    /// Used when the primary backend belongs to the provider's own tooling.
    #[must_use]
    pub fn without_promotion(mut self) -> Self {
        self.promote = false;
        self
    }

    /// Owning provider.
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Backend descriptions in priority order.
    pub fn describe(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.describe()).collect()
    }

    /// Finds the first backend holding a usable credential.
    #[instrument(skip(self, ctx), fields(provider = %self.provider))]
    pub async fn resolve(&self, ctx: &ProbeContext) -> Option<ResolvedCredential> {
        for (index, backend) in self.backends.iter().enumerate() {
            let document = match backend.load(ctx).await {
                Ok(Some(document)) => document,
                Ok(None) => {
                    debug!(backend = %backend.describe(), "No credential");
                    continue;
                }
                Err(e) => {
                    debug!(backend = %backend.describe(), error = %e, "Backend read failed");
                    continue;
                }
            };

            let template = Credential {
                document: document.clone(),
                ..Credential::empty(self.provider, backend.source())
            };
            let Some(credential) = self
                .codec
                .decode(&document, template)
                .filter(Credential::is_usable)
            else {
                debug!(backend = %backend.describe(), "Stored document holds no usable credential");
                continue;
            };

            debug!(backend = %backend.describe(), "Credential resolved");
            let mut resolved = ResolvedCredential {
                credential,
                origin: index,
            };
            if index > 0 {
                self.promote(ctx, &mut resolved).await;
            }
            return Some(resolved);
        }
        None
    }

    async fn promote(&self, ctx: &ProbeContext, resolved: &mut ResolvedCredential) {
        let Some(primary) = self.backends.first() else {
            return;
        };
        if !self.promote || !primary.writable() {
            return;
        }
        let document = self.codec.encode(&resolved.credential);
        match primary.store(ctx, &document).await {
            Ok(()) => {
                info!(
                    provider = %self.provider,
                    from = %self.backends[resolved.origin].describe(),
                    to = %primary.describe(),
                    "Promoted credential to primary backend"
                );
                resolved.credential.document = document;
                resolved.origin = 0;
            }
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "Failed to promote credential");
            }
        }
    }

    /// Writes an updated credential back to where it came from, or to the
    /// primary backend when the origin is read-only.
    #[instrument(skip(self, ctx, resolved), fields(provider = %self.provider))]
    pub async fn persist(
        &self,
        ctx: &ProbeContext,
        resolved: &mut ResolvedCredential,
    ) -> Result<(), BackendError> {
        let target = self.write_target(resolved.origin)?;
        let document = self.codec.encode(&resolved.credential);
        self.backends[target].store(ctx, &document).await?;
        debug!(backend = %self.backends[target].describe(), "Credential persisted");
        resolved.credential.document = document;
        resolved.origin = target;
        Ok(())
    }

    /// Stores a credential obtained outside any backend (device flow) in the
    /// primary backend.
    pub async fn insert(
        &self,
        ctx: &ProbeContext,
        credential: Credential,
    ) -> Result<ResolvedCredential, BackendError> {
        let mut resolved = ResolvedCredential {
            credential,
            origin: 0,
        };
        self.persist(ctx, &mut resolved).await?;
        Ok(resolved)
    }

    /// Removes the credential from its origin backend if that backend is
    /// writable.
    pub async fn invalidate(&self, ctx: &ProbeContext, resolved: &ResolvedCredential) {
        let Some(backend) = self.backends.get(resolved.origin) else {
            return;
        };
        if !backend.writable() {
            return;
        }
        match backend.clear(ctx).await {
            Ok(()) => info!(provider = %self.provider, backend = %backend.describe(), "Invalidated stored credential"),
            Err(e) => warn!(provider = %self.provider, error = %e, "Failed to invalidate credential"),
        }
    }

    fn write_target(&self, origin: usize) -> Result<usize, BackendError> {
        if self.backends.get(origin).is_some_and(|b| b.writable()) {
            return Ok(origin);
        }
        match self.backends.first() {
            Some(primary) if primary.writable() => Ok(0),
            Some(primary) => Err(BackendError::ReadOnly(primary.describe())),
            None => Err(BackendError::ReadOnly(format!("{} has no backends", self.provider))),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("provider", &self.provider)
            .field("backends", &self.describe())
            .field("promote", &self.promote)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
