//! Usage metering state machine.
//!
//! Per request the gate classifies the presented token, the handler decides
//! whether to fall back to the entitlement resolver, and a successful
//! generation settles the session into its next rotation:
//!
//! ```text
//! NoToken ──────────────► resolver mints Active
//! Invalid / Expired ────► rejected, or resolver re-mints when a cs_id or
//!                         bearer accompanies the request
//! BadIters / Exhausted ─► rejected (401 / 403)
//! Active ───────────────► generate, settle, rotate
//! ```
//!
//! The gate is stateless on purpose: all session state rides in the signed
//! token, so any replica can serve any request. The known cost is that two
//! concurrent requests presenting the same token both validate against the
//! same counter and produce two divergent next tokens; the client keeps one.
//! That race is accepted for this workload, not mitigated.

use crate::policy::SessionPolicy;
use crate::token::{self, TokenError, TokenPayload, TOKEN_VERSION};

/// A live session extracted from a valid token or freshly minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_ref: String,
    pub uses_remaining: u32,
    pub expires_at: i64,
    pub user_ref: Option<String>,
}

/// Whether the call bills an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Plain generation: consumes one use on success.
    Generate,
    /// Resume of a truncated reply: free, but only with a valid token.
    Continue,
}

/// Classification of a presented (or absent) token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// No token in the request; bootstrap via the entitlement resolver.
    NoToken,
    /// Decode failed; the token is indistinguishable from garbage.
    Invalid(TokenError),
    /// Signature fine, `now` is strictly past `expires_at`.
    Expired,
    /// Signature fine, but the counter is negative. Treated like a bad
    /// token rather than clamped.
    BadIters,
    /// Signature fine, no uses left. Terminal for this session.
    Exhausted,
    /// Usable session.
    Active(Session),
}

/// Decode and classify a token against the clock.
///
/// Order matters and mirrors the trust boundary: signature first, then
/// expiry, then counter sanity, then quota. An expired token's counter is
/// never inspected.
pub fn evaluate(presented: Option<&str>, secret: &[u8], now: i64) -> TokenState {
    let Some(raw) = presented.map(str::trim).filter(|t| !t.is_empty()) else {
        return TokenState::NoToken;
    };

    let payload = match token::decode(raw, secret) {
        Ok(p) => p,
        Err(e) => return TokenState::Invalid(e),
    };

    if payload.expires_at <= 0 || now > payload.expires_at {
        return TokenState::Expired;
    }
    if payload.uses_remaining < 0 {
        return TokenState::BadIters;
    }
    if payload.uses_remaining == 0 {
        return TokenState::Exhausted;
    }

    TokenState::Active(Session {
        subject_ref: payload.subject_ref,
        uses_remaining: payload.uses_remaining as u32,
        expires_at: payload.expires_at,
        user_ref: payload.user_ref,
    })
}

impl Session {
    /// Fresh session for a just-verified purchase or entitlement.
    pub fn mint(
        subject_ref: impl Into<String>,
        user_ref: Option<String>,
        policy: SessionPolicy,
        now: i64,
    ) -> Self {
        Self {
            subject_ref: subject_ref.into(),
            uses_remaining: policy.max_uses,
            expires_at: now + policy.ttl_seconds,
            user_ref,
        }
    }

    /// The session after a successful call. Continuations are free;
    /// generations decrement by one. `expires_at` is carried unchanged.
    pub fn settle(&self, kind: CallKind) -> Session {
        let uses_remaining = match kind {
            CallKind::Generate => self.uses_remaining.saturating_sub(1),
            CallKind::Continue => self.uses_remaining,
        };
        Session {
            subject_ref: self.subject_ref.clone(),
            uses_remaining,
            expires_at: self.expires_at,
            user_ref: self.user_ref.clone(),
        }
    }

    /// Sign the session into the rotated bearer token for the response.
    pub fn to_token(&self, secret: &[u8]) -> String {
        token::encode(
            &TokenPayload {
                subject_ref: self.subject_ref.clone(),
                uses_remaining: i64::from(self.uses_remaining),
                expires_at: self.expires_at,
                version: TOKEN_VERSION,
                user_ref: self.user_ref.clone(),
            },
            secret,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
