//! The gated generation endpoints, one per product.
//!
//! Request handling runs gate-first: classify the presented token, fall back
//! to the entitlement resolver only where that is allowed, orchestrate the
//! generation, and only then settle the session and rotate the token. Any
//! failure before settlement leaves the caller's token as it was.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use ghostops_core::history::{self, Role, Turn};
use ghostops_core::{gate, CallKind, DenyReason, Product, Session, TokenState};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Denied};
use crate::orchestrator;
use crate::prompts::{PromptPlan, Variant};
use crate::resolver::{self, Proof};
use crate::state::AppState;

/// A history turn as the client sends it; foreign roles are dropped later.
#[derive(Debug, Deserialize)]
pub struct RawTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// The user's new message. `description` is the historical field name.
    #[serde(default, alias = "description")]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<RawTurn>,
    #[serde(default, alias = "csId")]
    pub cs_id: Option<String>,
    #[serde(default, rename = "sessionToken", alias = "token")]
    pub session_token: Option<String>,
    #[serde(default, rename = "continue")]
    pub continue_: bool,
    #[serde(default, alias = "lastAssistant")]
    pub last_assistant: Option<String>,
}

pub async fn diagnostic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, AppError> {
    handle(state, Product::Diagnostic, headers, req).await
}

pub async fn studio_scenarios(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, AppError> {
    handle(state, Product::StudioScenarios, headers, req).await
}

pub async fn pre_brief_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, AppError> {
    handle(state, Product::PreBriefBoard, headers, req).await
}

pub fn bearer_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn to_history(raw: &[RawTurn]) -> Vec<Turn> {
    raw.iter()
        .filter_map(|t| {
            let role = match t.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return None,
            };
            Some(Turn {
                role,
                content: t.content.clone(),
            })
        })
        .collect()
}

fn deny(reason: DenyReason) -> AppError {
    let message = match reason {
        DenyReason::MissingToken => "A session token or proof of purchase is required.",
        DenyReason::Expired => "This session has expired. Please start a new one.",
        DenyReason::Exhausted => {
            "This session has no iterations left. Purchase a new session to continue."
        }
        DenyReason::BadIters => "This session token is not usable.",
        _ => "This session token is invalid.",
    };
    AppError::denied(Denied::new(reason, message))
}

async fn handle(
    state: AppState,
    product: Product,
    headers: HeaderMap,
    req: GenerateRequest,
) -> Result<Json<Value>, AppError> {
    let now = chrono::Utc::now().timestamp();
    let secret = state.config.token_secret.as_bytes().to_vec();

    let message = req.message.as_deref().unwrap_or("").trim().to_string();
    let history = to_history(&req.history);
    let last_assistant = req
        .last_assistant
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    if !req.continue_ && message.is_empty() {
        return Err(AppError::bad_request("message is required"));
    }
    if req.continue_ && last_assistant.is_none() && history.len() < 2 {
        return Err(AppError::bad_request(
            "continue requires the previous reply, either as last_assistant or in history",
        ));
    }

    let token_state = gate::evaluate(req.session_token.as_deref(), &secret, now);

    // Continuations never bootstrap a session: without a live token there is
    // nothing to continue.
    let (session, created_new) = if req.continue_ {
        match token_state {
            TokenState::Active(s) => (s, false),
            TokenState::NoToken => return Err(deny(DenyReason::MissingToken)),
            TokenState::Invalid(e) => return Err(deny(e.into())),
            TokenState::Expired => return Err(deny(DenyReason::Expired)),
            TokenState::BadIters => return Err(deny(DenyReason::BadIters)),
            TokenState::Exhausted => return Err(deny(DenyReason::Exhausted)),
        }
    } else {
        bootstrap(&state, product, token_state, &req, &headers, now).await?
    };

    let variant = if req.continue_ {
        Variant::Continue
    } else {
        PromptPlan::infer_followup(&history, !created_new)
    };

    // Continuation context: the explicit field wins, else the newest
    // assistant turn from history.
    let continuation_tail = last_assistant.or_else(|| {
        history
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.clone())
    });

    let history_used = history::normalize(&history).len();
    let plan = PromptPlan {
        product,
        variant,
        message,
        history,
        last_assistant: continuation_tail,
    };

    let generated = orchestrator::run(state.generator.as_ref(), &state.config.generation, &plan)
        .await?;

    let kind = if req.continue_ {
        CallKind::Continue
    } else {
        CallKind::Generate
    };
    let settled = session.settle(kind);
    let rotated = settled.to_token(&secret);

    tracing::info!(
        product = %product,
        subject = %settled.subject_ref,
        iters_left = settled.uses_remaining,
        continued = req.continue_,
        retried = generated.retried,
        "generation settled"
    );

    Ok(Json(json!({
        "ok": true,
        "reply": generated.text,
        "sessionToken": rotated,
        "itersLeft": settled.uses_remaining,
        "expiresAt": settled.expires_at,
        "meta": {
            "model": state.config.generation.model,
            "continued": req.continue_,
            "followup": variant == Variant::Followup,
            "historyUsed": history_used,
            "incomplete": generated.incomplete,
            "retried": generated.retried,
            "createdNewSession": created_new,
        },
    })))
}

/// Resolve the session for a billable call: an active token wins; a dead or
/// absent token falls back to the proof of purchase or identity, when one
/// accompanies the request.
async fn bootstrap(
    state: &AppState,
    product: Product,
    token_state: TokenState,
    req: &GenerateRequest,
    headers: &HeaderMap,
    now: i64,
) -> Result<(Session, bool), AppError> {
    match token_state {
        TokenState::Active(s) => Ok((s, false)),
        // A tampered counter is never eligible for fallback.
        TokenState::BadIters => Err(deny(DenyReason::BadIters)),
        TokenState::Exhausted => Err(deny(DenyReason::Exhausted)),
        dead @ (TokenState::NoToken | TokenState::Invalid(_) | TokenState::Expired) => {
            let proof = Proof {
                cs_id: req
                    .cs_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                bearer: bearer_from(headers),
            };
            if proof.is_empty() {
                return Err(deny(match dead {
                    TokenState::Invalid(e) => e.into(),
                    TokenState::Expired => DenyReason::Expired,
                    _ => DenyReason::MissingToken,
                }));
            }
            let session = resolver::resolve(state, product, &proof, now).await?;
            Ok((session, true))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
