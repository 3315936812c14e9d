//! Cursor credential mapping.

use std::sync::Arc;

use openusage_core::{Credential, ProviderId};
use openusage_fetch::{
    CredentialCodec, CredentialStore, FileLocation, OAuthRefresher, ProviderAuth, RefreshTrigger,
    SqliteItemBackend, TokenPolicy,
};
use serde_json::{Value, json};

/// OAuth token endpoint.
pub const TOKEN_URL: &str = "https://api2.cursor.sh/oauth/token";

/// OAuth client id of the Cursor editor.
pub const CLIENT_ID: &str = "KbZUR41cY7W6zRSdpSUJ7I7mLYBKOCmB";

/// `ItemTable` keys by document field.
const ITEMS: [(&str, &str); 3] = [
    ("accessToken", "cursorAuth/accessToken"),
    ("refreshToken", "cursorAuth/refreshToken"),
    ("membershipType", "cursorAuth/stripeMembershipType"),
];

/// The editor's global state database.
pub fn state_db_path() -> &'static str {
    if cfg!(target_os = "macos") {
        "~/Library/Application Support/Cursor/User/globalStorage/state.vscdb"
    } else {
        "~/.config/Cursor/User/globalStorage/state.vscdb"
    }
}

/// Maps the flat item document.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorCodec;

impl CredentialCodec for CursorCodec {
    fn decode(&self, document: &Value, mut credential: Credential) -> Option<Credential> {
        let field = |key: &str| document.get(key).and_then(Value::as_str).map(String::from);
        credential.access_token = field("accessToken");
        credential.refresh_token = field("refreshToken");
        credential.subscription_type = field("membershipType");
        Some(credential)
    }

    fn encode(&self, credential: &Credential) -> Value {
        let mut doc = json!({"accessToken": credential.access_token});
        if let Some(refresh) = &credential.refresh_token {
            doc["refreshToken"] = json!(refresh);
        }
        doc
    }
}

/// Credential chain and refresh policy for Cursor.
pub fn cursor_auth() -> ProviderAuth {
    let store = CredentialStore::new(ProviderId::Cursor, Arc::new(CursorCodec)).backend(
        SqliteItemBackend::new(FileLocation::Path(state_db_path().to_string()), ITEMS.to_vec()),
    );

    ProviderAuth::new(store, "Not signed in. Sign in to the Cursor editor.").policy(
        TokenPolicy::new(
            RefreshTrigger::expiry(),
            OAuthRefresher::json(TOKEN_URL, CLIENT_ID).logout_flag("shouldLogout"),
        ),
    )
}
