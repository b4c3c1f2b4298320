//! Stripe webhook signatures.
//!
//! Stripe signs each webhook with HMAC-SHA256 over `"{timestamp}.{raw body}"`, keyed with the endpoint's signing
//! secret, and sends the result in the `Stripe-Signature` header as `t=<unix time>,v1=<hex digest>`. During secret
//! rotation the header carries more than one `v1` entry, and any one of them may match.
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use ledger_common::Secret;
use log::*;
use sha2::Sha256;

use crate::errors::SignatureError;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";
const SIGNATURE_SCHEME: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Hex-encoded `v1` signatures. Other schemes are ignored.
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| SignatureError::MalformedHeader(format!("'{}' is not a key=value pair", part.trim())))?;
        match key.trim() {
            "t" => {
                let t = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| SignatureError::MalformedHeader(format!("Invalid timestamp. {e}")))?;
                timestamp = Some(t);
            },
            SIGNATURE_SCHEME => signatures.push(value.trim().to_string()),
            other => trace!("🔐️ Ignoring signature scheme {other}"),
        }
    }
    let timestamp = timestamp.ok_or_else(|| SignatureError::MalformedHeader("No timestamp".into()))?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader("No v1 signature".into()));
    }
    Ok(SignatureHeader { timestamp, signatures })
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// The hex-encoded `v1` signature Stripe would send for `payload` at `timestamp`.
pub fn calculate_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// A complete `Stripe-Signature` header value for `payload`.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = calculate_signature(secret, timestamp, payload)?;
    Ok(format!("t={timestamp},{SIGNATURE_SCHEME}={signature}"))
}

/// Checks a `Stripe-Signature` header against the raw request body.
///
/// The timestamp must be within `tolerance` of `now` in either direction. Digests are compared in constant time.
pub fn verify_signature(
    secret: &Secret<String>,
    header: Option<&str>,
    payload: &[u8],
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    if !secret.is_set() {
        return Err(SignatureError::NotConfigured);
    }
    let header = parse_signature_header(header.ok_or(SignatureError::MissingHeader)?)?;
    let age = now.timestamp() - header.timestamp;
    if age.abs() > tolerance.num_seconds() {
        return Err(SignatureError::StaleTimestamp { age });
    }
    let mac = signed_payload_mac(secret.reveal(), header.timestamp, payload)?;
    let matched = header
        .signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if matched {
        Ok(())
    } else {
        Err(SignatureError::NoMatchingSignature)
    }
}
