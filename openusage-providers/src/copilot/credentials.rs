//! Copilot credential mapping and GitHub sign-in.

use std::sync::Arc;

use openusage_core::{Credential, ProviderId};
use openusage_fetch::{
    CredentialCodec, CredentialStore, DeviceFlow, DeviceFlowConfig, FileBackend, FileLocation,
    KeychainAccount, KeychainBackend, ProviderAuth,
};
use serde_json::{Value, json};

/// Keychain service written by the GitHub CLI.
pub const GH_KEYCHAIN_SERVICE: &str = "gh:github.com";

/// GitHub CLI host configuration.
pub const GH_HOSTS_FILE: &str = "~/.config/gh/hosts.yml";

/// OAuth app used for the device flow.
pub const CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

/// Device code endpoint.
pub const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";

/// Token endpoint polled during the device flow.
pub const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

const SCOPE: &str = "read:user";
const GH_HOST: &str = "github.com";

/// Maps the token shapes found in Copilot's backends:
///
/// - `{"token": "gho_..."}` (app-owned entries)
/// - `"gho_..."` (GitHub CLI keychain)
/// - `{"github.com": {"oauth_token": "gho_..."}}` (GitHub CLI `hosts.yml`)
#[derive(Debug, Clone, Copy, Default)]
pub struct CopilotCodec;

impl CredentialCodec for CopilotCodec {
    fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
        let token = match document {
            Value::String(token) => Some(token.as_str()),
            Value::Object(obj) => obj
                .get("token")
                .or_else(|| obj.get(GH_HOST).and_then(|host| host.get("oauth_token")))
                .and_then(Value::as_str),
            _ => None,
        }?;
        credential.access_token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
        Some(credential)
    }

    fn encode(&self, credential: &Credential) -> Value {
        let mut doc = match &credential.document {
            Value::Object(obj) if obj.contains_key("token") => credential.document.clone(),
            _ => json!({}),
        };
        doc["token"] = json!(credential.access_token);
        doc
    }
}

/// Device flow against GitHub.
pub fn github_device_flow() -> DeviceFlow {
    DeviceFlow::new(
        ProviderId::Copilot,
        DeviceFlowConfig {
            device_code_url: DEVICE_CODE_URL.to_string(),
            token_url: ACCESS_TOKEN_URL.to_string(),
            client_id: CLIENT_ID.to_string(),
            scope: SCOPE.to_string(),
        },
    )
}

/// Credential chain and sign-in for Copilot.
pub fn copilot_auth() -> ProviderAuth {
    let store = CredentialStore::new(ProviderId::Copilot, Arc::new(CopilotCodec))
        .backend(KeychainBackend::owned(ProviderId::Copilot))
        .backend(
            KeychainBackend::foreign(GH_KEYCHAIN_SERVICE, KeychainAccount::Named(String::new()))
                .token_values()
                .read_only(),
        )
        .backend(FileBackend::yaml(FileLocation::Path(GH_HOSTS_FILE.to_string())))
        .backend(FileBackend::json(FileLocation::ProviderData {
            provider: ProviderId::Copilot,
            file: "auth.json",
        }));

    ProviderAuth::new(store, "Not signed in. Run `openusage login copilot` or `gh auth login`.")
        .device_flow(github_device_flow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openusage_core::CredentialSource;

    fn decode(document: Value) -> Option<Credential> {
        let template = Credential {
            document: document.clone(),
            ..Credential::empty(ProviderId::Copilot, CredentialSource::File)
        };
        CopilotCodec.decode(&document, template)
    }

    #[test]
    fn test_decode_shapes() {
        assert_eq!(decode(json!("gho_bare")).unwrap().bearer(), Some("gho_bare"));
        assert_eq!(decode(json!({"token": "gho_own"})).unwrap().bearer(), Some("gho_own"));
        assert_eq!(
            decode(json!({"github.com": {"user": "octocat", "oauth_token": "gho_yaml"}}))
                .unwrap()
                .bearer(),
            Some("gho_yaml")
        );
        assert!(decode(json!({"github.com": {"user": "octocat"}})).is_none());
    }

    #[test]
    fn test_encode_writes_owned_shape() {
        let cred = decode(json!({"github.com": {"oauth_token": "gho_yaml"}})).unwrap();
        assert_eq!(CopilotCodec.encode(&cred), json!({"token": "gho_yaml"}));
    }
}
