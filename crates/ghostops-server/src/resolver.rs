//! Entitlement resolver: turns proof of purchase or identity into a fresh
//! session.
//!
//! Two proofs are accepted, checked in this order:
//!
//!   1. a checkout session id (`cs_id`), verified against the payment
//!      collaborator, which must report the session paid and, when a price
//!      is configured for the product, carrying that price;
//!   2. a bearer credential, resolved to a user who must hold an active
//!      right for the product.
//!
//! Either proof mints a session at the product's full policy. No proof is
//! the `missing_token` denial.

use ghostops_core::{DenyReason, Product, Session};
use serde_json::json;

use crate::collaborators::UpstreamError;
use crate::error::{AppError, Denied};
use crate::state::AppState;

/// Proof material accompanying a request that lacks a usable token.
#[derive(Debug, Default)]
pub struct Proof {
    pub cs_id: Option<String>,
    pub bearer: Option<String>,
}

impl Proof {
    pub fn is_empty(&self) -> bool {
        self.cs_id.is_none() && self.bearer.is_none()
    }
}

/// Verify the proof and mint a session, or explain the denial.
pub async fn resolve(
    state: &AppState,
    product: Product,
    proof: &Proof,
    now: i64,
) -> Result<Session, AppError> {
    if let Some(cs_id) = proof.cs_id.as_deref() {
        return from_payment(state, product, cs_id, now).await;
    }
    if let Some(bearer) = proof.bearer.as_deref() {
        return from_identity(state, product, bearer, now).await;
    }
    Err(AppError::denied(Denied::new(
        DenyReason::MissingToken,
        "A session token or proof of purchase is required.",
    )))
}

async fn from_payment(
    state: &AppState,
    product: Product,
    cs_id: &str,
    now: i64,
) -> Result<Session, AppError> {
    let summary = match state.payments.retrieve_checkout(cs_id).await {
        Ok(s) => s,
        // An unknown session id is a denial, not a gateway fault.
        Err(UpstreamError::Api { status: 404, .. }) => {
            return Err(AppError::denied(Denied::new(
                DenyReason::NotPaid,
                "This checkout session does not exist.",
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if !summary.is_paid() {
        return Err(AppError::denied(
            Denied::new(DenyReason::NotPaid, "Payment has not been completed.").with_debug(
                json!({
                    "status": summary.status,
                    "paymentStatus": summary.payment_status,
                }),
            ),
        ));
    }

    let product_cfg = state.config.product(product);
    if let Some(price_id) = product_cfg.price_id.as_deref() {
        if !summary.has_price(price_id) {
            return Err(AppError::denied(Denied::new(
                DenyReason::WrongProduct,
                "This purchase does not cover the requested product.",
            )));
        }
    }

    tracing::info!(cs_id = %summary.id, product = %product, "session minted from payment");
    Ok(Session::mint(summary.id, None, product_cfg.policy, now))
}

async fn from_identity(
    state: &AppState,
    product: Product,
    bearer: &str,
    now: i64,
) -> Result<Session, AppError> {
    let Some(identity) = state.identity.as_ref() else {
        return Err(crate::config::ConfigError::Missing("SUPABASE_URL").into());
    };

    let Some(user) = identity.resolve_user(bearer).await? else {
        return Err(AppError::denied(Denied::new(
            DenyReason::MissingBearer,
            "Your sign-in is invalid or expired. Please sign in again.",
        )));
    };

    if !identity.has_right(&user.id, product.key()).await? {
        return Err(AppError::denied(Denied::new(
            DenyReason::NoRight,
            "Your account has no active access to this product.",
        )));
    }

    let policy = state.config.product(product).policy;
    tracing::info!(user = %user.id, product = %product, "session minted from entitlement");
    Ok(Session::mint(
        format!("sb_{}", user.id),
        Some(user.id),
        policy,
        now,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
