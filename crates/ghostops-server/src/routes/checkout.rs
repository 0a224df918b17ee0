//! Checkout session creation.
//!
//! Redirect URLs are always built from the configured site origin, never
//! from request headers. The client may supply an idempotency key so a
//! double-click creates one checkout, not two.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use ghostops_core::Product;
use serde_json::{json, Value};

use crate::collaborators::NewCheckout;
use crate::config::ConfigError;
use crate::error::AppError;
use crate::state::AppState;

const IDEMPOTENCY_KEY_MAX: usize = 128;

fn price_var(product: Product) -> &'static str {
    match product {
        Product::Diagnostic => "STRIPE_PRICE_ID_DIAGNOSTIC",
        Product::StudioScenarios => "STRIPE_PRICE_ID_STUDIO_SCENARIOS",
        Product::PreBriefBoard => "STRIPE_PRICE_ID_PRE_BRIEF_BOARD",
    }
}

pub async fn create(
    State(state): State<AppState>,
    Path(product_key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let Some(product) = Product::from_key(&product_key) else {
        return Err(AppError::bad_request(format!(
            "unknown product '{product_key}'"
        )));
    };

    let Some(price_id) = state.config.product(product).price_id.clone() else {
        return Err(ConfigError::Missing(price_var(product)).into());
    };

    let origin = &state.config.public_origin;
    let slug = product.page_slug();
    let idempotency_key = headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| k.chars().take(IDEMPOTENCY_KEY_MAX).collect::<String>());

    let now = chrono::Utc::now().timestamp();
    let created = state
        .payments
        .create_checkout(NewCheckout {
            price_id,
            success_url: format!("{origin}/{slug}-session.html?cs_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/{slug}-checkout.html?canceled=1"),
            expires_at: now + state.config.stripe.checkout_expires_in,
            idempotency_key,
        })
        .await?;

    tracing::info!(product = %product, cs_id = %created.id, "checkout created");

    Ok(Json(json!({
        "ok": true,
        "id": created.id,
        "url": created.url,
        "expiresAt": created.expires_at,
    })))
}
