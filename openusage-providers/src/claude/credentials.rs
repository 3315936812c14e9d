//! Claude OAuth credential mapping.

use std::sync::Arc;

use openusage_core::{Credential, ProviderId};
use openusage_fetch::{
    CredentialCodec, CredentialStore, FileBackend, FileLocation, KeychainAccount, KeychainBackend,
    OAuthRefresher, ProviderAuth, RefreshTrigger, TokenPolicy,
};
use serde_json::{Map, Value, json};

/// Credentials file written by the Claude CLI.
pub const CREDENTIALS_FILE: &str = "~/.claude/.credentials.json";

/// Keychain service used by the Claude CLI on macOS.
pub const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";

/// OAuth token endpoint.
pub const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// OAuth client id of the Claude CLI.
pub const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// Scope required by the usage endpoint.
pub const PROFILE_SCOPE: &str = "user:profile";

const OAUTH_KEY: &str = "claudeAiOauth";

/// Maps `{"claudeAiOauth": {...}}` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCodec;

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl CredentialCodec for ClaudeCodec {
    fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
        let oauth = document.get(OAUTH_KEY)?.as_object()?;
        credential.access_token = string_field(oauth, "accessToken");
        credential.refresh_token = string_field(oauth, "refreshToken");
        #[allow(clippy::cast_possible_truncation)]
        let expires_at_ms = oauth
            .get("expiresAt")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        credential.expires_at_ms = expires_at_ms;
        credential.subscription_type = string_field(oauth, "subscriptionType");
        Some(credential)
    }

    fn encode(&self, credential: &Credential) -> Value {
        let mut doc = credential.document.clone();
        if !doc.is_object() {
            doc = json!({});
        }
        if !doc[OAUTH_KEY].is_object() {
            doc[OAUTH_KEY] = json!({});
        }
        let oauth = &mut doc[OAUTH_KEY];
        oauth["accessToken"] = json!(credential.access_token);
        if let Some(refresh) = &credential.refresh_token {
            oauth["refreshToken"] = json!(refresh);
        }
        if let Some(expires_at) = credential.expires_at_ms {
            oauth["expiresAt"] = json!(expires_at);
        }
        doc
    }
}

/// Whether the token was granted the profile scope.
///
/// Tokens without a recorded scope list are assumed to have it.
pub fn has_profile_scope(credential: &Credential) -> bool {
    match credential.document[OAUTH_KEY].get("scopes").and_then(Value::as_array) {
        Some(scopes) => scopes.iter().any(|s| s.as_str() == Some(PROFILE_SCOPE)),
        None => true,
    }
}

/// Credential chain and refresh policy for Claude.
pub fn claude_auth() -> ProviderAuth {
    let store = CredentialStore::new(ProviderId::Claude, Arc::new(ClaudeCodec))
        .backend(FileBackend::json(FileLocation::Path(CREDENTIALS_FILE.to_string())))
        .backend(KeychainBackend::foreign(
            KEYCHAIN_SERVICE,
            KeychainAccount::CurrentUser,
        ))
        .without_promotion();

    ProviderAuth::new(store, "Not signed in. Run `claude` to sign in.").policy(TokenPolicy::new(
        RefreshTrigger::expiry(),
        OAuthRefresher::json(TOKEN_URL, CLIENT_ID),
    ))
}
