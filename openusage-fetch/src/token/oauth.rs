//! OAuth 2.0 refresh-token grant.

use async_trait::async_trait;
use openusage_core::Credential;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::policy::{RefreshRejected, TokenGrant, TokenRefresher};
use crate::context::ProbeContext;
use crate::host::HttpRequest;

/// How the token request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<f64>,
}

/// [`TokenRefresher`] for a standard OAuth token endpoint.
///
/// A 400/401 response whose error code is in the terminal list is an
/// explicit rejection; every other failure is soft.
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    token_url: String,
    client_id: String,
    encoding: BodyEncoding,
    scope: Option<String>,
    terminal_codes: Vec<&'static str>,
    logout_flag: Option<&'static str>,
}

impl OAuthRefresher {
    /// Refresher posting a JSON body.
    pub fn json(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(token_url, client_id, BodyEncoding::Json)
    }

    /// Refresher posting a form body.
    pub fn form(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(token_url, client_id, BodyEncoding::Form)
    }

    fn new(token_url: impl Into<String>, client_id: impl Into<String>, encoding: BodyEncoding) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            encoding,
            scope: None,
            terminal_codes: vec!["invalid_grant"],
            logout_flag: None,
        }
    }

    /// Sends a `scope` with the request.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Additional error codes that mean the refresh token is dead.
    #[must_use]
    pub fn terminal_codes(mut self, codes: &[&'static str]) -> Self {
        self.terminal_codes.extend_from_slice(codes);
        self
    }

    /// A boolean response field that, when `true`, forces a new sign-in.
    #[must_use]
    pub fn logout_flag(mut self, field: &'static str) -> Self {
        self.logout_flag = Some(field);
        self
    }

    /// Token endpoint URL.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn request(&self, refresh_token: &str) -> HttpRequest {
        let req = HttpRequest::post(&self.token_url).header("Accept", "application/json");
        match self.encoding {
            BodyEncoding::Json => {
                let mut body = json!({
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token,
                    "client_id": self.client_id,
                });
                if let Some(scope) = &self.scope {
                    body["scope"] = json!(scope);
                }
                req.json(&body)
            }
            BodyEncoding::Form => {
                let mut fields = vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                ];
                if let Some(scope) = &self.scope {
                    fields.push(("scope", scope.as_str()));
                }
                req.form(&fields)
            }
        }
    }

    fn is_terminal(&self, status: u16, body: &Value) -> Option<String> {
        if status != 400 && status != 401 {
            return None;
        }
        let code = error_code(body)?;
        self.terminal_codes.contains(&code.as_str()).then_some(code)
    }
}

/// Extracts an OAuth error code from `{"error": "code"}` or
/// `{"error": {"code": "code"}}`.
fn error_code(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(code) => Some(code.clone()),
        Value::Object(obj) => obj
            .get("code")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    #[instrument(skip(self, ctx, credential), fields(provider = %credential.provider))]
    async fn refresh(
        &self,
        ctx: &ProbeContext,
        credential: &Credential,
    ) -> Result<Option<TokenGrant>, RefreshRejected> {
        let Some(refresh_token) = credential.refresh() else {
            debug!("No refresh token stored");
            return Ok(None);
        };

        let response = match ctx.http.send(self.request(refresh_token)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                return Ok(None);
            }
        };

        let body: Value = response.json().unwrap_or(Value::Null);

        if !response.is_success() {
            if let Some(code) = self.is_terminal(response.status, &body) {
                warn!(status = response.status, code = %code, "Refresh token rejected");
                return Err(RefreshRejected { reason: code });
            }
            warn!(status = response.status, "Refresh failed");
            return Ok(None);
        }

        if let Some(flag) = self.logout_flag {
            if body.get(flag).and_then(Value::as_bool) == Some(true) {
                warn!(flag, "Server requested logout");
                return Err(RefreshRejected {
                    reason: flag.to_string(),
                });
            }
        }

        let parsed: TokenResponse = match serde_json::from_value(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Malformed refresh response");
                return Ok(None);
            }
        };
        let Some(access_token) = parsed.access_token.filter(|t| !t.is_empty()) else {
            warn!("Refresh response has no access token");
            return Ok(None);
        };

        #[allow(clippy::cast_possible_truncation)]
        let expires_at_ms = parsed
            .expires_in
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| ctx.now_ms() + (s * 1000.0) as i64);

        debug!(rotated = parsed.refresh_token.is_some(), "Token refreshed");
        Ok(Some(TokenGrant {
            access_token,
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
            id_token: parsed.id_token.filter(|t| !t.is_empty()),
            expires_at_ms,
        }))
    }
}
