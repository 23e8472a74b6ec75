// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-Hub-Signature-256` verification.
//!
//! Runs on the raw request bytes before any JSON parsing. Every failure mode
//! collapses to `false`; callers answer 403 without saying why.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const PREFIX: &str = "sha256=";

/// Verify `header` (`sha256=<hex>`) against an HMAC-SHA256 of `body`.
///
/// Returns `false` when the header or secret is missing or empty, the
/// prefix is wrong, the digest is not hex, or the digest does not match.
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: Option<&str>) -> bool {
    let (Some(header), Some(secret)) = (header, secret) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }
    let Some(hex_digest) = header.trim().strip_prefix(PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice compares in constant time.
    mac.verify_slice(&expected).is_ok()
}

/// Compute the header value the platform would send for `body`.
pub fn sign(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
