//! Probe failures and their classification.
//!
//! Every way a probe can fail ends up as one [`ProbeError`]. Its
//! [`kind`](ProbeError::kind) places it in the closed [`ErrorKind`] taxonomy
//! and its [`user_message`](ProbeError::user_message) is what the UI shows.
//! The `Display` output carries the details and is for logs only.

use openusage_core::{ErrorKind, ProbeOutcome};
use thiserror::Error;

use crate::error::HttpError;
use crate::host::HttpResponse;
use crate::host::http::is_auth_status;
use crate::host::redact::body_preview;

/// A probe failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No credential found in any backend.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// A device authorization is waiting for the user.
    #[error("Device authorization pending")]
    DeviceFlowPending {
        /// Where the user enters the code.
        verification_uri: String,
        /// Code to enter.
        user_code: String,
    },

    /// The device code expired before the user finished.
    #[error("Device authorization expired")]
    DeviceFlowExpired,

    /// The device authorization was denied or failed.
    #[error("Device authorization failed: {0}")]
    DeviceFlowFailed(String),

    /// The refresh token was rejected.
    #[error("Re-authentication required: {0}")]
    ReAuthRequired(String),

    /// Still 401/403 after the one allowed refresh.
    #[error("Authorization still rejected after refresh")]
    AuthRetryExhausted,

    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-auth HTTP error.
    #[error("HTTP {status}: {body}")]
    Server {
        /// Status code.
        status: u16,
        /// Redacted body preview.
        body: String,
    },

    /// Unparseable response.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Usage is not available for this auth mode.
    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(String),
}

impl ProbeError {
    /// Taxonomy bucket.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated(_)
            | Self::DeviceFlowPending { .. }
            | Self::DeviceFlowExpired
            | Self::DeviceFlowFailed(_) => ErrorKind::NotAuthenticated,
            Self::ReAuthRequired(_) => ErrorKind::ReAuthRequired,
            Self::AuthRetryExhausted => ErrorKind::AuthRetryExhausted,
            Self::Network(_) => ErrorKind::Network,
            Self::Server { status, .. } => ErrorKind::ServerError(*status),
            Self::Malformed(_) => ErrorKind::MalformedResponse,
            Self::FeatureUnavailable(_) => ErrorKind::FeatureUnavailable,
        }
    }

    /// Short, actionable message for the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated(hint) if !hint.is_empty() => hint.clone(),
            Self::DeviceFlowPending {
                verification_uri,
                user_code,
            } => format!("Visit {verification_uri} and enter code {user_code}"),
            Self::DeviceFlowExpired => "Sign-in code expired. Refresh to get a new code.".into(),
            Self::DeviceFlowFailed(_) => "Sign-in was not completed. Refresh to try again.".into(),
            Self::FeatureUnavailable(message) if !message.is_empty() => message.clone(),
            other => other.kind().default_message(),
        }
    }

    /// Converts into a probe outcome.
    pub fn into_outcome(self) -> ProbeOutcome {
        ProbeOutcome::Error {
            kind: self.kind(),
            message: self.user_message(),
        }
    }

    /// Classifies an unsuccessful HTTP response.
    ///
    /// Auth-class statuses reaching this point have already used up the
    /// refresh budget.
    pub fn from_status(response: &HttpResponse) -> Self {
        if is_auth_status(response.status) {
            Self::AuthRetryExhausted
        } else {
            Self::Server {
                status: response.status,
                body: body_preview(&response.body),
            }
        }
    }
}

impl From<HttpError> for ProbeError {
    fn from(err: HttpError) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Passes 2xx responses through and classifies everything else.
pub fn ensure_success(response: HttpResponse) -> Result<HttpResponse, ProbeError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ProbeError::from_status(&response))
    }
}
