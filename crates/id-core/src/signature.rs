// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant-time verification of the `X-Hub-Signature-256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a `sha256=<hex>` signature header over the raw request body.
///
/// Returns `false` (never panics, never raises) when the secret is empty,
/// the header is missing the `sha256=` prefix, the hex digest is malformed,
/// or the digest does not match. The comparison itself is constant-time via
/// [`Mac::verify_slice`].
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(digest_hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let body = b"{\"action\":\"opened\"}";
        let header = sign("topsecret", body);
        assert!(verify_signature(body, &header, "topsecret"));
    }

    #[test]
    fn empty_secret_always_fails() {
        let body = b"payload";
        let header = sign("", body);
        assert!(!verify_signature(body, &header, ""));
    }

    #[test]
    fn missing_prefix_fails() {
        let body = b"payload";
        assert!(!verify_signature(body, "deadbeef", "secret"));
    }

    #[test]
    fn bit_flip_in_body_fails() {
        let body = b"payload-one";
        let header = sign("secret", body);
        let mut flipped = body.to_vec();
        flipped[0] ^= 0x01;
        assert!(!verify_signature(&flipped, &header, "secret"));
    }

    #[test]
    fn bit_flip_in_signature_fails() {
        let body = b"payload-two";
        let mut header = sign("secret", body);
        // Flip the last hex nibble.
        let last = header.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        header.push(flipped);
        assert!(!verify_signature(body, &header, "secret"));
    }

    #[test]
    fn malformed_hex_fails() {
        let body = b"payload";
        assert!(!verify_signature(body, "sha256=not-hex!!", "secret"));
    }

    #[test]
    fn odd_length_hex_fails() {
        let body = b"payload";
        assert!(!verify_signature(body, "sha256=abc", "secret"));
    }
}
