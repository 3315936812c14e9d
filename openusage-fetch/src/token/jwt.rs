//! Unverified JWT payload decoding.
//!
//! Only used to read claims such as `exp` from tokens this process already
//! trusts; signatures are never checked.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

/// Decodes the payload (second segment) of a JWT.
pub fn decode_payload(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        value @ Value::Object(_) => Some(value),
        _ => None,
    }
}

/// The `exp` claim in epoch milliseconds.
pub fn expires_at_ms(token: &str) -> Option<i64> {
    let exp = decode_payload(token)?.get("exp")?.as_f64()?;
    if !exp.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let ms = (exp * 1000.0) as i64;
    Some(ms)
}

/// Builds an unsigned token carrying `payload`.
#[cfg(any(test, feature = "testing"))]
pub fn make_token(payload: &Value) -> String {
    format!(
        "eyJhbGciOiJub25lIn0.{}.sig",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payload() {
        let token = make_token(&json!({"sub": "user-1", "exp": 1_700_000_000}));
        let payload = decode_payload(&token).unwrap();
        assert_eq!(payload["sub"], "user-1");
    }

    #[test]
    fn test_expires_at_ms() {
        let token = make_token(&json!({"exp": 1_700_000_000}));
        assert_eq!(expires_at_ms(&token), Some(1_700_000_000_000));
        assert_eq!(expires_at_ms(&make_token(&json!({"sub": "x"}))), None);
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert_eq!(decode_payload("opaque-token"), None);
        assert_eq!(decode_payload("a.b"), None);
        assert_eq!(decode_payload("a.b.c.d"), None);
        assert_eq!(decode_payload("a.!!!.c"), None);
    }

    #[test]
    fn test_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":1}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(expires_at_ms(&token), Some(1000));
    }
}
