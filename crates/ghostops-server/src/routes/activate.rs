//! Right activation: attach a verified purchase to a signed-in account so
//! future sessions can be minted from identity alone, without the cs_id.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use ghostops_core::{DenyReason, Product};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collaborators::UpstreamError;
use crate::config::ConfigError;
use crate::error::{AppError, Denied};
use crate::routes::generate::bearer_from;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    #[serde(alias = "csId")]
    pub cs_id: String,
    pub product: String,
}

pub async fn activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<Value>, AppError> {
    let Some(product) = Product::from_key(req.product.trim()) else {
        return Err(AppError::bad_request(format!(
            "unknown product '{}'",
            req.product
        )));
    };

    let Some(bearer) = bearer_from(&headers) else {
        return Err(AppError::denied(Denied::new(
            DenyReason::MissingBearer,
            "Sign in before activating a purchase.",
        )));
    };

    let Some(identity) = state.identity.as_ref() else {
        return Err(ConfigError::Missing("SUPABASE_URL").into());
    };

    let Some(user) = identity.resolve_user(&bearer).await? else {
        return Err(AppError::denied(Denied::new(
            DenyReason::MissingBearer,
            "Your sign-in is invalid or expired. Please sign in again.",
        )));
    };

    let summary = match state.payments.retrieve_checkout(req.cs_id.trim()).await {
        Ok(s) => s,
        Err(UpstreamError::Api { status: 404, .. }) => {
            return Err(AppError::denied(Denied::new(
                DenyReason::NotPaid,
                "This checkout session does not exist.",
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if !summary.is_paid() {
        return Err(AppError::denied(Denied::new(
            DenyReason::NotPaid,
            "Payment has not been completed.",
        )));
    }
    if let Some(price_id) = state.config.product(product).price_id.as_deref() {
        if !summary.has_price(price_id) {
            return Err(AppError::denied(Denied::new(
                DenyReason::WrongProduct,
                "This purchase does not cover the requested product.",
            )));
        }
    }

    let right = identity.grant_right(&user.id, product.key()).await?;
    tracing::info!(user = %user.id, product = %product, "right activated");

    Ok(Json(json!({
        "ok": true,
        "activated": true,
        "right": right,
        "user": { "id": user.id, "email": user.email },
    })))
}
