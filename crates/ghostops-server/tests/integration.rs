//! End-to-end tests over the full router with scripted collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use ghostops_core::{token, Session, SessionPolicy};
use ghostops_server::build_router;
use ghostops_server::collaborators::{
    CheckoutSummary, CreatedCheckout, GenerationInput, GenerationReply, IdentityProvider,
    NewCheckout, PaymentVerifier, RightRow, TextGenerator, UpstreamError, UserIdentity,
};
use ghostops_server::config::Config;
use ghostops_server::state::AppState;

const SECRET: &str = "integration-test-secret";

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

struct Payments {
    sessions: HashMap<String, CheckoutSummary>,
}

impl Payments {
    fn none() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    fn with_paid(cs_id: &str, price: &str) -> Self {
        let summary = CheckoutSummary {
            id: cs_id.to_string(),
            status: Some("complete".into()),
            payment_status: Some("paid".into()),
            amount_total: Some(79_000),
            currency: Some("eur".into()),
            line_item_prices: vec![price.to_string()],
        };
        Self {
            sessions: HashMap::from([(cs_id.to_string(), summary)]),
        }
    }
}

#[async_trait]
impl PaymentVerifier for Payments {
    async fn retrieve_checkout(&self, cs_id: &str) -> Result<CheckoutSummary, UpstreamError> {
        self.sessions.get(cs_id).cloned().ok_or(UpstreamError::Api {
            service: "payment",
            status: 404,
            message: format!("No such checkout.session: {cs_id}"),
        })
    }

    async fn create_checkout(&self, new: NewCheckout) -> Result<CreatedCheckout, UpstreamError> {
        Ok(CreatedCheckout {
            id: "cs_created".into(),
            url: Some(format!("https://checkout.example/{}", new.price_id)),
            expires_at: Some(new.expires_at),
        })
    }
}

struct Identity {
    user: Option<UserIdentity>,
    entitled: bool,
    granted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl IdentityProvider for Identity {
    async fn resolve_user(&self, _: &str) -> Result<Option<UserIdentity>, UpstreamError> {
        Ok(self.user.clone())
    }

    async fn has_right(&self, _: &str, _: &str) -> Result<bool, UpstreamError> {
        Ok(self.entitled)
    }

    async fn grant_right(&self, user_id: &str, product: &str) -> Result<RightRow, UpstreamError> {
        self.granted
            .lock()
            .unwrap()
            .push((user_id.to_string(), product.to_string()));
        Ok(RightRow {
            user_id: user_id.to_string(),
            product: product.to_string(),
            status: "active".into(),
        })
    }
}

struct Generator {
    delay_ms: u64,
    reply: String,
}

impl Generator {
    fn instant() -> Self {
        Self {
            delay_ms: 0,
            reply: "Understood. Here is the analysis you asked for.".into(),
        }
    }

    fn sleeping(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            reply: "too late".into(),
        }
    }
}

#[async_trait]
impl TextGenerator for Generator {
    async fn generate(&self, _: &GenerationInput) -> Result<GenerationReply, UpstreamError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        Ok(GenerationReply {
            text: self.reply.clone(),
            incomplete: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn test_config(extra: &[(&'static str, &str)]) -> Config {
    let mut env: HashMap<&'static str, String> = HashMap::from([
        ("GHOSTOPS_TOKEN_SECRET", SECRET.to_string()),
        ("STRIPE_SECRET_KEY", "sk_test_x".to_string()),
        ("OPENAI_API_KEY", "oa_test_x".to_string()),
        ("STRIPE_PRICE_ID_PRE_BRIEF_BOARD", "price_board".to_string()),
    ]);
    for (k, v) in extra {
        env.insert(k, v.to_string());
    }
    Config::from_lookup(|name| env.get(name).cloned()).unwrap()
}

fn router(payments: Payments, identity: Option<Identity>, generator: Generator) -> Router {
    router_with(test_config(&[]), payments, identity, generator)
}

fn router_with(
    config: Config,
    payments: Payments,
    identity: Option<Identity>,
    generator: Generator,
) -> Router {
    build_router(AppState::with_collaborators(
        config,
        Arc::new(payments),
        identity.map(|i| Arc::new(i) as Arc<dyn IdentityProvider>),
        Arc::new(generator),
    ))
}

async fn post(
    app: &Router,
    uri: &str,
    body: Value,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(b) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {b}"));
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn mint_token(uses: u32, ttl: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    Session::mint(
        "cs_live",
        None,
        SessionPolicy {
            max_uses: uses,
            ttl_seconds: ttl,
        },
        now,
    )
    .to_token(SECRET.as_bytes())
}

fn exhausted_token() -> String {
    let now = chrono::Utc::now().timestamp();
    Session {
        subject_ref: "cs_live".into(),
        uses_remaining: 0,
        expires_at: now + 1_000,
        user_ref: None,
    }
    .to_token(SECRET.as_bytes())
}

fn expired_token() -> String {
    let now = chrono::Utc::now().timestamp();
    Session {
        subject_ref: "cs_live".into(),
        uses_remaining: 5,
        expires_at: now - 10,
        user_ref: None,
    }
    .to_token(SECRET.as_bytes())
}

// ---------------------------------------------------------------------------
// Bootstrap and metering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paid_checkout_bootstraps_a_session() {
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "Brief the board on the outage.", "cs_id": "cs_paid_1" }),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["itersLeft"], 14);
    assert_eq!(body["meta"]["createdNewSession"], true);
    assert_eq!(body["meta"]["continued"], false);

    // The rotated token verifies under the gate secret and carries the count.
    let payload =
        token::decode(body["sessionToken"].as_str().unwrap(), SECRET.as_bytes()).unwrap();
    assert_eq!(payload.uses_remaining, 14);
    assert_eq!(payload.subject_ref, "cs_paid_1");
}

#[tokio::test]
async fn active_token_is_decremented_and_rotated() {
    let app = router(Payments::none(), None, Generator::instant());
    let t = mint_token(3, 1_000);
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "Next question.", "sessionToken": t }),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itersLeft"], 2);
    assert_eq!(body["meta"]["createdNewSession"], false);
    assert_eq!(body["meta"]["followup"], true);
}

#[tokio::test]
async fn token_chain_runs_down_to_exhausted() {
    let app = router(Payments::none(), None, Generator::instant());
    let mut t = mint_token(2, 1_000);

    for expected in [1, 0] {
        let (status, body) = post(
            &app,
            "/api/pre-brief-board",
            json!({ "message": "again", "sessionToken": t }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["itersLeft"], expected);
        t = body["sessionToken"].as_str().unwrap().to_string();
    }

    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "one more", "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "exhausted");
}

#[tokio::test]
async fn exhausted_token_is_403_even_with_proof() {
    // Exhaustion is terminal; a new purchase starts a new request without
    // the dead token.
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": exhausted_token(), "cs_id": "cs_paid_1" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "exhausted");
}

// ---------------------------------------------------------------------------
// Token failure and fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_token_without_proof_is_denied() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": expired_token() }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "expired");
}

#[tokio::test]
async fn expired_token_with_paid_cs_id_gets_a_fresh_session() {
    let app = router(
        Payments::with_paid("cs_paid_2", "price_board"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": expired_token(), "cs_id": "cs_paid_2" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itersLeft"], 14);
    assert_eq!(body["meta"]["createdNewSession"], true);
}

#[tokio::test]
async fn tampered_token_without_proof_is_bad_signature() {
    let app = router(Payments::none(), None, Generator::instant());
    let mut t = mint_token(5, 1_000);
    // Flip a payload character.
    let flipped = if t.starts_with('A') { "B" } else { "A" };
    t.replace_range(0..1, flipped);

    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["reason"] == "bad_signature" || body["reason"] == "bad_payload");
}

#[tokio::test]
async fn unpaid_checkout_is_not_paid() {
    let mut payments = Payments::with_paid("cs_open", "price_board");
    payments
        .sessions
        .get_mut("cs_open")
        .unwrap()
        .payment_status = Some("unpaid".into());
    let app = router(payments, None, Generator::instant());

    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "cs_id": "cs_open" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "not_paid");
}

#[tokio::test]
async fn wrong_price_is_wrong_product() {
    let app = router(
        Payments::with_paid("cs_paid_other", "price_something_else"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "cs_id": "cs_paid_other" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "wrong_product");
}

#[tokio::test]
async fn bearer_with_right_bootstraps_without_cs_id() {
    let app = router(
        Payments::none(),
        Some(Identity {
            user: Some(UserIdentity {
                id: "u-7".into(),
                email: Some("u7@example.org".into()),
            }),
            entitled: true,
            granted: Mutex::new(vec![]),
        }),
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m" }),
        Some("user-access-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itersLeft"], 14);
    let payload =
        token::decode(body["sessionToken"].as_str().unwrap(), SECRET.as_bytes()).unwrap();
    assert_eq!(payload.subject_ref, "sb_u-7");
    assert_eq!(payload.user_ref.as_deref(), Some("u-7"));
}

#[tokio::test]
async fn bearer_without_right_is_no_right() {
    let app = router(
        Payments::none(),
        Some(Identity {
            user: Some(UserIdentity {
                id: "u-7".into(),
                email: None,
            }),
            entitled: false,
            granted: Mutex::new(vec![]),
        }),
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m" }),
        Some("user-access-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "no_right");
}

#[tokio::test]
async fn no_token_and_no_proof_is_missing_token() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(&app, "/api/pre-brief-board", json!({ "message": "m" }), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "missing_token");
}

// ---------------------------------------------------------------------------
// Continuation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn continue_is_free() {
    let app = router(Payments::none(), None, Generator::instant());
    let t = mint_token(5, 1_000);
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({
            "continue": true,
            "sessionToken": t,
            "last_assistant": "The brief so far, cut mid-sentence",
        }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itersLeft"], 5);
    assert_eq!(body["meta"]["continued"], true);
}

#[tokio::test]
async fn continue_without_token_is_denied_even_with_proof() {
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "continue": true, "last_assistant": "tail", "cs_id": "cs_paid_1" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "missing_token");
}

#[tokio::test]
async fn continue_with_exhausted_token_is_403() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "continue": true, "sessionToken": exhausted_token(), "last_assistant": "tail" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "exhausted");
}

#[tokio::test]
async fn continue_without_context_is_400() {
    let app = router(Payments::none(), None, Generator::instant());
    let t = mint_token(5, 1_000);
    let (status, _) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "continue": true, "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Validation and failure accounting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_message_is_400() {
    let app = router(Payments::none(), None, Generator::instant());
    let t = mint_token(5, 1_000);
    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn generation_timeout_is_504_and_charges_nothing() {
    let config = test_config(&[("GHOSTOPS_TIMEOUT_MS", "50")]);
    let app = router_with(config, Payments::none(), None, Generator::sleeping(300));
    let t = mint_token(5, 1_000);

    let (status, body) = post(
        &app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["sessionToken"].is_null());

    // The same token is still worth its full five uses.
    let ok_app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(
        &ok_app,
        "/api/pre-brief-board",
        json!({ "message": "m", "sessionToken": t }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itersLeft"], 4);
}

#[tokio::test]
async fn responses_are_never_cacheable() {
    let app = router(Payments::none(), None, Generator::instant());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/pre-brief-board")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "message": "m" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, max-age=0"
    );
}

// ---------------------------------------------------------------------------
// Purchase plumbing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkout_creates_a_session_for_a_configured_product() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(&app, "/api/checkout/pre-brief", json!({}), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "cs_created");
    assert_eq!(body["url"], "https://checkout.example/price_board");
}

#[tokio::test]
async fn checkout_for_unknown_product_is_400() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, _) = post(&app, "/api/checkout/enterprise", json!({}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_without_configured_price_is_500() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, _) = post(&app, "/api/checkout/diagnostic", json!({}), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn verify_reports_paid_sessions() {
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        None,
        Generator::instant(),
    );
    let (status, body) = post(&app, "/api/verify", json!({ "cs_id": "cs_paid_1" }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["paymentStatus"], "paid");
}

#[tokio::test]
async fn verify_unknown_session_is_not_verified() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, body) = post(&app, "/api/verify", json!({ "cs_id": "cs_ghost" }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
}

#[tokio::test]
async fn verify_rejects_non_checkout_ids() {
    let app = router(Payments::none(), None, Generator::instant());
    let (status, _) = post(&app, "/api/verify", json!({ "cs_id": "sub_123" }), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn activate_right_grants_after_verified_payment() {
    let identity = Identity {
        user: Some(UserIdentity {
            id: "u-7".into(),
            email: Some("u7@example.org".into()),
        }),
        entitled: false,
        granted: Mutex::new(vec![]),
    };
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        Some(identity),
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/activate-right",
        json!({ "cs_id": "cs_paid_1", "product": "pre-brief" }),
        Some("user-access-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activated"], true);
    assert_eq!(body["right"]["product"], "pre-brief");
    assert_eq!(body["user"]["id"], "u-7");
}

#[tokio::test]
async fn activate_right_requires_a_bearer() {
    let app = router(
        Payments::with_paid("cs_paid_1", "price_board"),
        Some(Identity {
            user: None,
            entitled: false,
            granted: Mutex::new(vec![]),
        }),
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/activate-right",
        json!({ "cs_id": "cs_paid_1", "product": "pre-brief" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "missing_bearer");
}

#[tokio::test]
async fn activate_right_rejects_unpaid_sessions() {
    let mut payments = Payments::with_paid("cs_open", "price_board");
    payments
        .sessions
        .get_mut("cs_open")
        .unwrap()
        .payment_status = Some("unpaid".into());
    let app = router(
        payments,
        Some(Identity {
            user: Some(UserIdentity {
                id: "u-7".into(),
                email: None,
            }),
            entitled: false,
            granted: Mutex::new(vec![]),
        }),
        Generator::instant(),
    );
    let (status, body) = post(
        &app,
        "/api/activate-right",
        json!({ "cs_id": "cs_open", "product": "pre-brief" }),
        Some("user-access-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "not_paid");
}
