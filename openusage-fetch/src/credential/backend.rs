//! Credential backends.
//!
//! A backend reads and writes one stored credential document. Backends know
//! nothing about a provider's document layout; that is the job of the
//! provider's [`CredentialCodec`](super::CredentialCodec).

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use openusage_core::{CredentialSource, ProviderId};
use serde_json::{Map, Value};
use tracing::debug;

use super::decode::{SecretShape, decode_secret, encode_compact};
use crate::context::ProbeContext;
use crate::error::{BackendError, FileError};
use crate::host::keychain::{current_user, owned_service};

// ============================================================================
// Backend Trait
// ============================================================================

/// One place a credential document can live.
#[async_trait]
pub trait CredentialBackend: Send + Sync + fmt::Debug {
    /// Kind of backend, recorded on loaded credentials.
    fn source(&self) -> CredentialSource;

    /// Short description for logs; never contains secrets.
    fn describe(&self) -> String;

    /// Whether [`store`](Self::store) is supported.
    fn writable(&self) -> bool {
        true
    }

    /// Reads the document. `Ok(None)` when nothing is stored.
    async fn load(&self, ctx: &ProbeContext) -> Result<Option<Value>, BackendError>;

    /// Overwrites the document.
    async fn store(&self, ctx: &ProbeContext, document: &Value) -> Result<(), BackendError>;

    /// Removes the document.
    async fn clear(&self, ctx: &ProbeContext) -> Result<(), BackendError>;
}

// ============================================================================
// Keychain Backend
// ============================================================================

/// Keychain account an entry is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeychainAccount {
    /// The login name of the current user.
    CurrentUser,
    /// A fixed account name.
    Named(String),
}

impl KeychainAccount {
    fn resolve(&self) -> String {
        match self {
            Self::CurrentUser => current_user(),
            Self::Named(name) => name.clone(),
        }
    }
}

/// Secret-store entry.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    service: String,
    account: KeychainAccount,
    shape: SecretShape,
    source: CredentialSource,
    writable: bool,
}

impl KeychainBackend {
    /// An entry owned by this application: `OpenUsage-<provider>`.
    pub fn owned(provider: ProviderId) -> Self {
        Self {
            service: owned_service(provider.cli_name()),
            account: KeychainAccount::Named("default".to_string()),
            shape: SecretShape::Json,
            source: CredentialSource::OwnedKeychain,
            writable: true,
        }
    }

    /// An entry written by the provider's own tooling.
    pub fn foreign(service: impl Into<String>, account: KeychainAccount) -> Self {
        Self {
            service: service.into(),
            account,
            shape: SecretShape::Json,
            source: CredentialSource::ForeignKeychain,
            writable: true,
        }
    }

    /// Accepts bare token values as well as JSON documents.
    #[must_use]
    pub fn token_values(mut self) -> Self {
        self.shape = SecretShape::Token;
        self
    }

    /// Never write to this entry.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Service name of the entry.
    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl CredentialBackend for KeychainBackend {
    fn source(&self) -> CredentialSource {
        self.source
    }

    fn describe(&self) -> String {
        format!("keychain:{}", self.service)
    }

    fn writable(&self) -> bool {
        self.writable
    }

    async fn load(&self, ctx: &ProbeContext) -> Result<Option<Value>, BackendError> {
        let raw = ctx.keychain.get(&self.service, &self.account.resolve()).await?;
        let decoded = raw.as_deref().and_then(|raw| decode_secret(raw, self.shape));
        if raw.is_some() && decoded.is_none() {
            debug!(service = %self.service, "Keychain value could not be decoded");
        }
        Ok(decoded)
    }

    async fn store(&self, ctx: &ProbeContext, document: &Value) -> Result<(), BackendError> {
        if !self.writable {
            return Err(BackendError::ReadOnly(self.describe()));
        }
        ctx.keychain
            .set(&self.service, &self.account.resolve(), &encode_compact(document))
            .await?;
        Ok(())
    }

    async fn clear(&self, ctx: &ProbeContext) -> Result<(), BackendError> {
        if !self.writable {
            return Err(BackendError::ReadOnly(self.describe()));
        }
        ctx.keychain.delete(&self.service, &self.account.resolve()).await?;
        Ok(())
    }
}

// ============================================================================
// File Backend
// ============================================================================

/// Where a file backend's file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    /// An absolute path, or one starting with `~/`.
    Path(String),
    /// A file inside the provider's data directory.
    ProviderData {
        /// Owning provider.
        provider: ProviderId,
        /// File name.
        file: &'static str,
    },
}

impl FileLocation {
    /// Resolves to a concrete path.
    pub fn resolve(&self, ctx: &ProbeContext) -> Result<PathBuf, FileError> {
        match self {
            Self::Path(path) => ctx.files.expand(path),
            Self::ProviderData { provider, file } => Ok(ctx.provider_data_dir(*provider).join(file)),
        }
    }
}

/// On-disk document format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileFormat {
    /// JSON, written pretty-printed.
    #[default]
    Json,
    /// YAML, read-only.
    Yaml,
}

/// A JSON or YAML file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    location: FileLocation,
    format: FileFormat,
    writable: bool,
}

impl FileBackend {
    /// A writable JSON file.
    pub fn json(location: FileLocation) -> Self {
        Self {
            location,
            format: FileFormat::Json,
            writable: true,
        }
    }

    /// A read-only YAML file.
    pub fn yaml(location: FileLocation) -> Self {
        Self {
            location,
            format: FileFormat::Yaml,
            writable: false,
        }
    }

    /// Never write to this file.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

#[async_trait]
impl CredentialBackend for FileBackend {
    fn source(&self) -> CredentialSource {
        CredentialSource::File
    }

    fn describe(&self) -> String {
        match &self.location {
            FileLocation::Path(path) => format!("file:{path}"),
            FileLocation::ProviderData { provider, file } => format!("file:<data>/{provider}/{file}"),
        }
    }

    fn writable(&self) -> bool {
        self.writable
    }

    async fn load(&self, ctx: &ProbeContext) -> Result<Option<Value>, BackendError> {
        let path = self.location.resolve(ctx)?;
        let Some(text) = ctx.files.read_text(&path).await? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = match self.format {
            FileFormat::Json => serde_json::from_str(&text)?,
            FileFormat::Yaml => serde_yaml::from_str(&text)?,
        };
        Ok(Some(value).filter(Value::is_object))
    }

    async fn store(&self, ctx: &ProbeContext, document: &Value) -> Result<(), BackendError> {
        if !self.writable || self.format == FileFormat::Yaml {
            return Err(BackendError::ReadOnly(self.describe()));
        }
        let path = self.location.resolve(ctx)?;
        let text = serde_json::to_string_pretty(document)?;
        ctx.files.write_text(&path, &text).await?;
        Ok(())
    }

    async fn clear(&self, ctx: &ProbeContext) -> Result<(), BackendError> {
        if !self.writable {
            return Err(BackendError::ReadOnly(self.describe()));
        }
        let path = self.location.resolve(ctx)?;
        ctx.files.remove(&path).await?;
        Ok(())
    }
}

// ============================================================================
// SQLite Item Backend
// ============================================================================

/// Several `ItemTable` keys of a VS Code-style state database, presented as
/// one flat JSON object (`field -> value`).
#[derive(Debug, Clone)]
pub struct SqliteItemBackend {
    location: FileLocation,
    fields: Vec<(&'static str, &'static str)>,
}

impl SqliteItemBackend {
    /// `fields` maps JSON field names to `ItemTable` keys.
    pub fn new(location: FileLocation, fields: Vec<(&'static str, &'static str)>) -> Self {
        Self { location, fields }
    }
}

#[async_trait]
impl CredentialBackend for SqliteItemBackend {
    fn source(&self) -> CredentialSource {
        CredentialSource::Database
    }

    fn describe(&self) -> String {
        match &self.location {
            FileLocation::Path(path) => format!("sqlite:{path}"),
            FileLocation::ProviderData { provider, file } => format!("sqlite:<data>/{provider}/{file}"),
        }
    }

    async fn load(&self, ctx: &ProbeContext) -> Result<Option<Value>, BackendError> {
        let path = self.location.resolve(ctx)?;
        if !ctx.files.exists(&path).await {
            return Ok(None);
        }
        let mut doc = Map::new();
        for (field, key) in &self.fields {
            if let Some(value) = ctx.sqlite.get_item(&path, key).await? {
                let value = value.trim().trim_matches('"').to_string();
                if !value.is_empty() {
                    doc.insert((*field).to_string(), Value::String(value));
                }
            }
        }
        Ok((!doc.is_empty()).then_some(Value::Object(doc)))
    }

    async fn store(&self, ctx: &ProbeContext, document: &Value) -> Result<(), BackendError> {
        let path = self.location.resolve(ctx)?;
        for (field, key) in &self.fields {
            if let Some(value) = document.get(*field).and_then(Value::as_str) {
                ctx.sqlite.set_item(&path, key, value).await?;
            }
        }
        Ok(())
    }

    async fn clear(&self, _ctx: &ProbeContext) -> Result<(), BackendError> {
        Err(BackendError::ReadOnly(self.describe()))
    }
}
