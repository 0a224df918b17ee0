//! Boundary traits for the external collaborators.
//!
//! Payment verification, identity/entitlement lookup, and text generation
//! are vendor services. The gate only depends on these traits; the reqwest
//! implementations live in the sibling modules and integration tests swap
//! in scripted stand-ins.

pub mod generation;
pub mod stripe;
pub mod supabase;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use generation::ResponsesClient;
pub use stripe::StripeClient;
pub use supabase::SupabaseClient;

/// Failure talking to any collaborator. `Api` keeps the upstream status so
/// the orchestrator can tell retryable congestion from a hard rejection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} unreachable: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unexpected response shape: {message}")]
    Shape {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    /// Timeouts, rate limits, and transient 5xx are worth one retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            Self::Transport { .. } => true,
            Self::Shape { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// A retrieved checkout session, reduced to what the gate needs.
#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    /// Price ids of the paid line items.
    pub line_item_prices: Vec<String>,
}

impl CheckoutSummary {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    pub fn has_price(&self, price_id: &str) -> bool {
        self.line_item_prices.iter().any(|p| p == price_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Absolute expiry of the checkout itself, unix seconds.
    pub expires_at: i64,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedCheckout {
    pub id: String,
    pub url: Option<String>,
    pub expires_at: Option<i64>,
}

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Read-only retrieval of a checkout session with its line items.
    async fn retrieve_checkout(&self, cs_id: &str) -> Result<CheckoutSummary, UpstreamError>;

    async fn create_checkout(&self, new: NewCheckout) -> Result<CreatedCheckout, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Identity / entitlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RightRow {
    pub user_id: String,
    pub product: String,
    pub status: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential. `Ok(None)` means the credential is
    /// invalid or expired, which is an expected outcome, not a fault.
    async fn resolve_user(&self, bearer: &str) -> Result<Option<UserIdentity>, UpstreamError>;

    /// Whether the user holds an active, non-revoked right for the product.
    async fn has_right(&self, user_id: &str, product_key: &str) -> Result<bool, UpstreamError>;

    /// Record (or reactivate) a right after a verified payment.
    async fn grant_right(&self, user_id: &str, product_key: &str)
        -> Result<RightRow, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PromptTurn {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub model: String,
    pub turns: Vec<PromptTurn>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationReply {
    pub text: String,
    /// The collaborator itself reported the output was cut by the budget.
    pub incomplete: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, input: &GenerationInput) -> Result<GenerationReply, UpstreamError>;
}
