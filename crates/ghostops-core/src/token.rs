//! Signed token codec.
//!
//! Wire format: `base64url(JSON payload) + "." + base64url(HMAC-SHA256 sig)`,
//! both segments unpadded. The signature covers the encoded payload segment,
//! so no payload byte is trusted before the MAC verifies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Current payload version tag. Bumped when the payload shape changes.
pub const TOKEN_VERSION: u32 = 3;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not two dot-separated segments")]
    BadFormat,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token payload is not valid JSON")]
    BadPayload,
}

/// The signed session payload carried by the client.
///
/// Field names on the wire match what the front-end already stores:
/// `cs_id` / `itersLeft` / `exp` / `v` / `uid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Authorized subject: a checkout-session id, or `sb_<user id>` when the
    /// session came from an identity-based entitlement.
    #[serde(rename = "cs_id")]
    pub subject_ref: String,

    /// Billable generation calls remaining. Signed so that a tampered or
    /// legacy negative value can be detected rather than wrapping.
    #[serde(rename = "itersLeft")]
    pub uses_remaining: i64,

    /// Absolute expiry, unix seconds. Fixed at mint; never extended.
    #[serde(rename = "exp")]
    pub expires_at: i64,

    #[serde(rename = "v")]
    pub version: u32,

    /// Present only for identity-originated sessions.
    #[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,
}

/// Serialize and sign a payload into a bearer token string.
pub fn encode(payload: &TokenPayload, secret: &[u8]) -> String {
    let json = serde_json::to_string(payload).expect("token payload serializes");
    let segment = URL_SAFE_NO_PAD.encode(json.as_bytes());
    let sig = sign(segment.as_bytes(), secret);
    format!("{segment}.{}", URL_SAFE_NO_PAD.encode(sig))
}

/// Verify and parse a token. The signature check is constant-time
/// (`Mac::verify_slice`); a mis-signed token yields `BadSignature` without
/// any payload inspection.
pub fn decode(token: &str, secret: &[u8]) -> Result<TokenPayload, TokenError> {
    let mut parts = token.split('.');
    let (segment, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
        _ => return Err(TokenError::BadFormat),
    };

    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(segment.as_bytes());
    mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::BadPayload)?;
    serde_json::from_slice(&json).map_err(|_| TokenError::BadPayload)
}

fn sign(data: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
