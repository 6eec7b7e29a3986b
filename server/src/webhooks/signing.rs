//! HMAC-SHA256 Payload Signatures
//!
//! The platform signs each delivery with the app secret and sends the digest
//! as `x-hub-signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header malformed")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

/// Sign a payload and return the hex-encoded digest.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Header value the platform would send for `payload`.
pub fn signature_header_value(secret: &str, payload: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign_payload(secret, payload))
}

/// Verify a `sha256=<hex>` header against the raw request body.
pub fn verify_signature_header(
    secret: &str,
    payload: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let digest = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Constant-time comparison for the subscription verify token.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len()
        && expected
            .as_bytes()
            .iter()
            .zip(presented.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
