//! Carrier request signatures.
//!
//! The carrier signs each voice callback with HMAC-SHA1 over the callback
//! URL followed by every posted parameter (`key` then `value`, keys in
//! lexicographic order), base64 encoded into the `x-zang-signature` header.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-zang-signature";

/// Query string the carrier appends when it follows the fallback redirect
/// emitted after a gather. Redirected callbacks are signed over the URL
/// with this suffix.
pub const REDIRECT_PARAMS: &str =
    "?PlayStatus=completed&SpeechResult=&SpeechResultError=redirect&Confidence=0";

pub fn compute_signature(secret: &[u8], url: &str, params: &BTreeMap<String, String>) -> String {
    STANDARD.encode(signing_mac(secret, url, params).finalize().into_bytes())
}

/// Accepts `presented` when it matches the signature of `canonical_url` or
/// of the redirect-suffixed variant. A missing or undecodable signature
/// never matches.
pub fn verify(
    secret: &[u8],
    canonical_url: &str,
    params: &BTreeMap<String, String>,
    presented: Option<&str>,
) -> bool {
    let Some(presented) = presented.map(str::trim).filter(|value| !value.is_empty()) else {
        return false;
    };
    let Ok(expected) = STANDARD.decode(presented) else {
        return false;
    };

    let redirect_url = format!("{canonical_url}{REDIRECT_PARAMS}");
    let candidates = [canonical_url, redirect_url.as_str()];
    let matched = candidates
        .iter()
        .any(|url| signing_mac(secret, url, params).verify_slice(&expected).is_ok());
    matched
}

fn signing_mac(secret: &[u8], url: &str, params: &BTreeMap<String, String>) -> HmacSha1 {
    let mut mac = HmacSha1::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(url.as_bytes());
    for (key, value) in params {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    mac
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{compute_signature, verify, REDIRECT_PARAMS};

    const SECRET: &[u8] = b"carrier-auth-token";
    const URL: &str = "https://bridge.example.com/carrier";

    fn params() -> BTreeMap<String, String> {
        [
            ("To", "+18004567890"),
            ("From", "+15551230000"),
            ("CallSid", "CA0001"),
            ("ApiVersion", "v2"),
            ("AccountSid", "AC0001"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    #[test]
    fn signature_covers_url_then_sorted_key_value_pairs() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        use hmac::Mac;

        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "2".to_string());
        params.insert("a".to_string(), "1".to_string());

        let mut mac = super::HmacSha1::new_from_slice(b"key").expect("hmac key");
        mac.update(b"https://x/ya1b2");
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        let signature = compute_signature(b"key", "https://x/y", &params);
        assert_eq!(signature, expected);
        assert_eq!(signature.len(), 28);
    }

    #[test]
    fn verify_accepts_canonical_url_signature() {
        let params = params();
        let signature = compute_signature(SECRET, URL, &params);

        assert!(verify(SECRET, URL, &params, Some(&signature)));
    }

    #[test]
    fn verify_accepts_redirect_variant_signature() {
        let params = params();
        let signature = compute_signature(SECRET, &format!("{URL}{REDIRECT_PARAMS}"), &params);

        assert!(verify(SECRET, URL, &params, Some(&signature)));
    }

    #[test]
    fn verify_rejects_every_single_byte_mutation() {
        let params = params();
        let signature = compute_signature(SECRET, URL, &params);

        for index in 0..signature.len() {
            let mut bytes = signature.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).expect("ascii signature");
            assert!(
                !verify(SECRET, URL, &params, Some(&mutated)),
                "mutation at byte {index} should be rejected"
            );
        }
    }

    #[test]
    fn verify_rejects_missing_signature_and_wrong_secret() {
        let params = params();
        let signature = compute_signature(SECRET, URL, &params);

        assert!(!verify(SECRET, URL, &params, None));
        assert!(!verify(SECRET, URL, &params, Some("")));
        assert!(!verify(b"other-secret", URL, &params, Some(&signature)));
    }

    #[test]
    fn verify_rejects_tampered_parameters() {
        let mut params = params();
        let signature = compute_signature(SECRET, URL, &params);
        params.insert("Digits".to_string(), "9".to_string());

        assert!(!verify(SECRET, URL, &params, Some(&signature)));
    }
}
