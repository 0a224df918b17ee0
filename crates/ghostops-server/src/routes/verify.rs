//! Read-only payment verification, used by the success page to decide
//! whether to unlock the product UI before the first generation call.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collaborators::UpstreamError;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "csId")]
    pub cs_id: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let cs_id = req.cs_id.trim();
    if !cs_id.starts_with("cs_") {
        return Err(AppError::bad_request("cs_id must be a checkout session id"));
    }

    let summary = match state.payments.retrieve_checkout(cs_id).await {
        Ok(s) => s,
        // Unknown id: answer "not verified" rather than a gateway fault.
        Err(UpstreamError::Api { status: 404, .. }) => {
            return Ok(Json(json!({
                "ok": true,
                "verified": false,
                "id": cs_id,
                "status": null,
                "paymentStatus": null,
            })));
        }
        Err(e) => return Err(e.into()),
    };

    let verified =
        summary.status.as_deref() == Some("complete") && summary.is_paid();

    Ok(Json(json!({
        "ok": true,
        "verified": verified,
        "id": summary.id,
        "status": summary.status,
        "paymentStatus": summary.payment_status,
        "amountTotal": summary.amount_total,
        "currency": summary.currency,
    })))
}
