//! Machine-readable denial reasons.
//!
//! Every rejection of a gated request carries one of these stable codes so
//! the front-end can route the user: pay again (`not_paid`, `wrong_product`),
//! log in again (`missing_bearer`, `no_right`), restart the session
//! (`expired`, `bad_signature`, ...) or contact support (`exhausted`).

use crate::token::TokenError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    MissingToken,
    BadFormat,
    BadSignature,
    BadPayload,
    Expired,
    BadIters,
    Exhausted,
    NotPaid,
    WrongProduct,
    MissingBearer,
    NoRight,
}

impl DenyReason {
    /// The stable wire code for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::BadFormat => "bad_format",
            Self::BadSignature => "bad_signature",
            Self::BadPayload => "bad_payload",
            Self::Expired => "expired",
            Self::BadIters => "bad_iters",
            Self::Exhausted => "exhausted",
            Self::NotPaid => "not_paid",
            Self::WrongProduct => "wrong_product",
            Self::MissingBearer => "missing_bearer",
            Self::NoRight => "no_right",
        }
    }

    /// Quota exhaustion is the one denial that maps to 403 rather than 401.
    pub fn is_quota(self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TokenError> for DenyReason {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::BadFormat => Self::BadFormat,
            TokenError::BadSignature => Self::BadSignature,
            TokenError::BadPayload => Self::BadPayload,
        }
    }
}
