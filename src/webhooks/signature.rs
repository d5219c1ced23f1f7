//! HMAC-SHA256 signatures for inbound payment webhooks.
//!
//! Two header layouts are accepted:
//! - `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>..]`
//! - `x-timestamp: <unix>` with `x-signature: <hex>`
//!
//! The signed message is `"{t}." + raw body`, so verification must run on the
//! exact bytes received, before any JSON parsing.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

fn mac_for(secret: &str, timestamp: &str, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Hex signature of `payload` at `timestamp`, as a sender would compute it.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    mac_for(secret, &timestamp.to_string(), payload)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Value for a `Stripe-Signature` header.
pub fn stripe_signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign(secret, timestamp, payload))
}

/// Signature candidates found in the headers: the timestamp and every hex
/// signature offered for it.
fn extract(headers: &HeaderMap) -> Option<(String, Vec<String>)> {
    if let Some(value) = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in value.split(',') {
            match part.trim().split_once('=') {
                Some(("t", ts)) => timestamp = Some(ts.to_string()),
                Some(("v1", sig)) => signatures.push(sig.to_string()),
                _ => {}
            }
        }
        return timestamp
            .filter(|_| !signatures.is_empty())
            .map(|ts| (ts, signatures));
    }

    let ts = headers.get(TIMESTAMP_HEADER)?.to_str().ok()?;
    let sig = headers.get(SIGNATURE_HEADER)?.to_str().ok()?;
    Some((ts.to_string(), vec![sig.to_string()]))
}

/// True when the headers carry a valid signature of `payload` made with
/// `secret` no more than `tolerance_secs` away from `now`.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let Some((timestamp, signatures)) = extract(headers) else {
        return false;
    };
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if now.abs_diff(ts) > tolerance_secs {
        return false;
    }

    signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        mac_for(secret, &timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"type":"checkout.session.completed"}"#;

    fn stripe_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(STRIPE_SIGNATURE_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_stripe_style_header() {
        let now = 1_700_000_000;
        let headers = stripe_headers(&stripe_signature_header(SECRET, now, BODY));
        assert!(verify_signature(&headers, BODY, SECRET, 300, now + 10));
    }

    #[test]
    fn accepts_generic_headers() {
        let now = 1_700_000_000;
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from(now));
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign(SECRET, now, BODY)).unwrap(),
        );
        assert!(verify_signature(&headers, BODY, SECRET, 300, now));
    }

    #[test]
    fn rejects_modified_body() {
        let now = 1_700_000_000;
        let headers = stripe_headers(&stripe_signature_header(SECRET, now, BODY));
        assert!(!verify_signature(&headers, b"{}", SECRET, 300, now));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let then = 1_700_000_000;
        let headers = stripe_headers(&stripe_signature_header(SECRET, then, BODY));
        assert!(!verify_signature(&headers, BODY, SECRET, 300, then + 301));
    }

    #[test]
    fn rejects_wrong_secret_and_missing_headers() {
        let now = 1_700_000_000;
        let headers = stripe_headers(&stripe_signature_header("other", now, BODY));
        assert!(!verify_signature(&headers, BODY, SECRET, 300, now));
        assert!(!verify_signature(&HeaderMap::new(), BODY, SECRET, 300, now));
        assert!(!verify_signature(&stripe_headers("t=1"), BODY, SECRET, 300, 1));
    }

    #[test]
    fn any_offered_v1_may_match() {
        let now = 1_700_000_000;
        let good = sign(SECRET, now, BODY);
        let headers = stripe_headers(&format!("t={},v1=deadbeef,v1={}", now, good));
        assert!(verify_signature(&headers, BODY, SECRET, 300, now));
    }
}
