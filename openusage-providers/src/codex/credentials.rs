//! Codex credential mapping.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use openusage_core::{Credential, ProviderId};
use openusage_fetch::token::jwt;
use openusage_fetch::{
    CredentialCodec, CredentialStore, FileBackend, FileLocation, KeychainAccount, KeychainBackend,
    OAuthRefresher, ProviderAuth, RefreshTrigger, TokenPolicy,
};
use serde_json::{Map, Value, json};

/// Keychain service used by the Codex CLI.
pub const KEYCHAIN_SERVICE: &str = "Codex Auth";

/// OAuth token endpoint.
pub const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";

/// OAuth client id of the Codex CLI.
pub const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

const REFRESH_SCOPE: &str = "openid profile email";

/// Claim namespace holding ChatGPT account details.
const AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// `$CODEX_HOME/auth.json`, or `~/.codex/auth.json`.
pub fn codex_auth_path() -> String {
    match std::env::var("CODEX_HOME") {
        Ok(home) if !home.trim().is_empty() => {
            format!("{}/auth.json", home.trim().trim_end_matches('/'))
        }
        _ => "~/.codex/auth.json".to_string(),
    }
}

/// Maps Codex `auth.json` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexCodec;

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// ChatGPT account id from the id token's auth claim.
fn account_from_id_token(id_token: &str) -> Option<String> {
    jwt::decode_payload(id_token)?
        .get(AUTH_CLAIM)?
        .get("chatgpt_account_id")?
        .as_str()
        .map(String::from)
}

impl CredentialCodec for CodexCodec {
    fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
        let tokens = document.get("tokens")?.as_object()?;
        credential.access_token = string_field(tokens, "access_token");
        credential.refresh_token = string_field(tokens, "refresh_token");
        credential.id_token = string_field(tokens, "id_token");
        credential.account_id = string_field(tokens, "account_id").or_else(|| {
            credential
                .id_token
                .as_deref()
                .and_then(account_from_id_token)
        });
        credential.last_refreshed_at_ms = document
            .get("last_refresh")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp_millis());
        Some(credential)
    }

    fn encode(&self, credential: &Credential) -> Value {
        let mut doc = credential.document.clone();
        if !doc.is_object() {
            doc = json!({});
        }
        if !doc["tokens"].is_object() {
            doc["tokens"] = json!({});
        }
        let tokens = &mut doc["tokens"];
        tokens["access_token"] = json!(credential.access_token);
        if let Some(refresh) = &credential.refresh_token {
            tokens["refresh_token"] = json!(refresh);
        }
        if let Some(id_token) = &credential.id_token {
            tokens["id_token"] = json!(id_token);
        }
        if let Some(account) = &credential.account_id {
            tokens["account_id"] = json!(account);
        }
        if let Some(at) = credential
            .last_refreshed_at_ms
            .and_then(DateTime::from_timestamp_millis)
        {
            doc["last_refresh"] = json!(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        doc
    }
}

/// Whether `document` only holds an API key, which the usage endpoint does
/// not accept.
pub fn is_api_key_only(document: &Value) -> bool {
    let has_key = document
        .get("OPENAI_API_KEY")
        .and_then(Value::as_str)
        .is_some_and(|k| !k.trim().is_empty());
    let has_tokens = document
        .get("tokens")
        .and_then(Value::as_object)
        .is_some_and(|t| !t.is_empty());
    has_key && !has_tokens
}

/// The `auth.json` backend on its own.
pub fn auth_file_backend() -> FileBackend {
    FileBackend::json(FileLocation::Path(codex_auth_path()))
}

/// Credential chain and refresh policy for Codex.
pub fn codex_auth() -> ProviderAuth {
    let store = CredentialStore::new(ProviderId::Codex, Arc::new(CodexCodec))
        .backend(auth_file_backend())
        .backend(KeychainBackend::foreign(
            KEYCHAIN_SERVICE,
            KeychainAccount::CurrentUser,
        ))
        .without_promotion();

    let refresher = OAuthRefresher::json(TOKEN_URL, CLIENT_ID)
        .scope(REFRESH_SCOPE)
        .terminal_codes(&[
            "refresh_token_expired",
            "refresh_token_reused",
            "refresh_token_invalidated",
        ]);

    ProviderAuth::new(store, "Not signed in. Run `codex login` to sign in.")
        .policy(TokenPolicy::new(RefreshTrigger::age(), refresher))
}
