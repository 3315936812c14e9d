//! Decoding of raw secret-store values.
//!
//! Secret stores hand back whatever the writing tool put in them:
//!
//! - plain JSON documents,
//! - `go-keyring-base64:`-prefixed base64 (Go CLIs using `zalando/go-keyring`),
//! - hex when the macOS `security` tool decides the payload is binary,
//! - bare tokens.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Prefix written by `go-keyring` for base64-wrapped values.
pub const GO_KEYRING_PREFIX: &str = "go-keyring-base64:";

/// What a backend's values are expected to look like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecretShape {
    /// A JSON object; anything else is discarded.
    #[default]
    Json,
    /// A JSON object or a bare token string.
    Token,
}

/// Decodes a raw secret into a JSON value.
///
/// JSON is always tried first; hex is only attempted when the direct parse
/// fails. Returns `None` for empty or undecodable input.
pub fn decode_secret(raw: &str, shape: SecretShape) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(encoded) = trimmed.strip_prefix(GO_KEYRING_PREFIX) {
        let bytes = STANDARD.decode(encoded.trim()).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        return decode_plain(&text, shape);
    }

    decode_plain(trimmed, shape)
}

fn decode_plain(text: &str, shape: SecretShape) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(value) = parse_object(text) {
        return Some(value);
    }

    if let Some(value) = decode_hex(text).and_then(|decoded| parse_object(decoded.trim())) {
        return Some(value);
    }

    match shape {
        SecretShape::Token if !text.contains(char::is_whitespace) => {
            Some(Value::String(text.to_string()))
        }
        _ => None,
    }
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn decode_hex(text: &str) -> Option<String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    String::from_utf8(bytes).ok()
}

/// Serializes a value for a secret-store write: compact, no newlines, bare
/// strings written as-is.
pub fn encode_compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let v = decode_secret(r#" {"accessToken":"a1"} "#, SecretShape::Json).unwrap();
        assert_eq!(v["accessToken"], "a1");
    }

    #[test]
    fn test_go_keyring_base64() {
        let encoded = STANDARD.encode(r#"{"oauth_token":"gho_x"}"#);
        let raw = format!("{GO_KEYRING_PREFIX}{encoded}");
        let v = decode_secret(&raw, SecretShape::Json).unwrap();
        assert_eq!(v["oauth_token"], "gho_x");
    }

    #[test]
    fn test_go_keyring_base64_bare_token() {
        let raw = format!("{GO_KEYRING_PREFIX}{}", STANDARD.encode("gho_abc123"));
        assert_eq!(
            decode_secret(&raw, SecretShape::Token),
            Some(Value::String("gho_abc123".into()))
        );
        assert_eq!(decode_secret(&raw, SecretShape::Json), None);
    }

    #[test]
    fn test_hex_fallback() {
        let doc = r#"{"claudeAiOauth":{"accessToken":"a"}}"#;
        let raw = hex::encode(doc);
        let v = decode_secret(&raw, SecretShape::Json).unwrap();
        assert_eq!(v["claudeAiOauth"]["accessToken"], "a");
    }

    #[test]
    fn test_garbage_is_discarded() {
        assert_eq!(decode_secret("not json at all", SecretShape::Json), None);
        assert_eq!(decode_secret("abcd", SecretShape::Json), None);
        assert_eq!(decode_secret("   ", SecretShape::Token), None);
        assert_eq!(decode_secret("two words", SecretShape::Token), None);
    }

    #[test]
    fn test_json_scalar_is_not_an_object() {
        assert_eq!(decode_secret("42", SecretShape::Json), None);
    }

    #[test]
    fn test_encode_compact_has_no_newlines() {
        let value = json!({"a": {"b": [1, 2]}, "c": "d"});
        let out = encode_compact(&value);
        assert!(!out.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), value);
        assert_eq!(encode_compact(&json!("gho_x")), "gho_x");
    }
}
