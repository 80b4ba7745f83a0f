//! `X-Inngest-Signature` HMAC-SHA256 scheme (spec §4.5): `t=<unix_secs>&s=<hex_hmac>`,
//! computed over the raw request body, keyed by the signing key with its
//! ascii prefix stripped.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CommError;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are rejected outright (spec §4.5).
pub const MAX_SIGNATURE_AGE_SECS: i64 = 5 * 60;

/// Signing keys are prefixed like `signkey-prod-<hex>`; the HMAC key is
/// everything after the second `-`. Keys with fewer than two dashes are
/// used verbatim (e.g. in tests).
fn strip_key_prefix(key: &str) -> &str {
    let mut dashes = key.match_indices('-');
    match (dashes.next(), dashes.next()) {
        (Some(_), Some((second, _))) => &key[second + 1..],
        _ => key,
    }
}

// HMAC-SHA256 accepts a key of any length (it pads/hashes internally).
#[allow(clippy::expect_used)]
fn hmac_hex(key: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(strip_key_prefix(key).as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Build the `t=...&s=...` header value for a response or outbound request.
pub fn sign(key: &str, body: &[u8], now_secs: i64) -> String {
    format!("t={now_secs}&s={}", hmac_hex(key, body))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedSignature<'a> {
    pub timestamp: i64,
    pub digest: &'a str,
}

pub fn parse(header: &str) -> Result<ParsedSignature<'_>, CommError> {
    let mut timestamp = None;
    let mut digest = None;
    for pair in header.split('&') {
        match pair.split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("s", v)) => digest = Some(v),
            _ => {}
        }
    }
    match (timestamp, digest) {
        (Some(timestamp), Some(digest)) => Ok(ParsedSignature { timestamp, digest }),
        _ => Err(CommError::SignatureInvalid),
    }
}

/// Verify `header` against `body` for a single candidate key. `now_secs`
/// and `skip_expiry` let tests and the dev-mode bypass avoid wall-clock
/// dependence.
pub fn verify_with_key(
    header: &str,
    body: &[u8],
    key: &str,
    now_secs: i64,
    skip_expiry: bool,
) -> Result<(), CommError> {
    let parsed = parse(header)?;
    if !skip_expiry && (now_secs - parsed.timestamp).abs() > MAX_SIGNATURE_AGE_SECS {
        return Err(CommError::SignatureExpired);
    }
    let expected = hmac_hex(key, body);
    if constant_time_eq(expected.as_bytes(), parsed.digest.as_bytes()) {
        Ok(())
    } else {
        Err(CommError::SignatureInvalid)
    }
}

/// Verify against the primary key, falling back to the secondary if
/// configured and the primary fails (spec §4.5). Returns which key
/// succeeded, since the response must be signed with that same key.
pub fn verify<'a>(
    header: &str,
    body: &[u8],
    primary: &'a str,
    secondary: Option<&'a str>,
    now_secs: i64,
    skip_expiry: bool,
) -> Result<&'a str, CommError> {
    if verify_with_key(header, body, primary, now_secs, skip_expiry).is_ok() {
        return Ok(primary);
    }
    if let Some(secondary) = secondary {
        if verify_with_key(header, body, secondary, now_secs, skip_expiry).is_ok() {
            return Ok(secondary);
        }
    }
    Err(CommError::SignatureInvalid)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
