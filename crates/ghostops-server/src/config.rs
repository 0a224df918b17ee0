//! Process configuration.
//!
//! Everything is read once at startup into an explicit `Config` that travels
//! through `AppState`; business logic never touches the environment. The
//! signing secret and collaborator keys have no defaults and fail startup
//! when absent.

use ghostops_core::{Product, SessionPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC key for session tokens. Required, never defaulted.
    pub token_secret: String,
    /// Canonical site origin for checkout redirect URLs. Always configured,
    /// never derived from request headers.
    pub public_origin: String,
    pub stripe: StripeConfig,
    /// Identity/entitlement collaborator; the bearer path is disabled when
    /// not configured.
    pub identity: Option<IdentityConfig>,
    pub generation: GenerationConfig,
    products: [ProductConfig; 3],
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    /// Lifetime of a created checkout session, seconds.
    pub checkout_expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub url: String,
    pub service_role_key: String,
    pub rights_table: String,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    /// Per-attempt wall-clock budget, milliseconds.
    pub timeout_ms: u64,
    pub max_output_tokens: u32,
    /// Smaller budget for free continuation calls.
    pub max_output_tokens_continue: u32,
}

#[derive(Debug, Clone)]
pub struct ProductConfig {
    pub product: Product,
    /// Expected checkout price id; when set, a paid session must carry it.
    pub price_id: Option<String>,
    pub policy: SessionPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup so tests need not mutate the process
    /// environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required =
            |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let token_secret = required("GHOSTOPS_TOKEN_SECRET")?;

        let stripe = StripeConfig {
            secret_key: required("STRIPE_SECRET_KEY")?,
            api_base: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
            checkout_expires_in: parse_or("STRIPE_CHECKOUT_EXPIRES_IN", &get, 3_600)?,
        };

        // Bearer path is optional: both variables or neither.
        let identity = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(IdentityConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
                rights_table: get("GHOSTOPS_RIGHTS_TABLE").unwrap_or_else(|| "rights".into()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("SUPABASE_URL")),
        };

        let generation = GenerationConfig {
            api_key: required("OPENAI_API_KEY")?,
            api_base: get("OPENAI_API_BASE").unwrap_or_else(|| "https://api.openai.com".into()),
            model: get("GHOSTOPS_MODEL").unwrap_or_else(|| "gpt-4.1-mini".into()),
            timeout_ms: parse_or("GHOSTOPS_TIMEOUT_MS", &get, 55_000)?,
            max_output_tokens: parse_or("GHOSTOPS_MAX_OUTPUT_TOKENS", &get, 1_100)?,
            max_output_tokens_continue: parse_or(
                "GHOSTOPS_MAX_OUTPUT_TOKENS_CONTINUE",
                &get,
                900,
            )?,
        };

        let products = [
            product_config(
                Product::Diagnostic,
                "STRIPE_PRICE_ID_DIAGNOSTIC",
                "GHOSTOPS_DIAGNOSTIC_MAX_ITERS",
                "GHOSTOPS_DIAGNOSTIC_TTL_SECONDS",
                &get,
            )?,
            product_config(
                Product::StudioScenarios,
                "STRIPE_PRICE_ID_STUDIO_SCENARIOS",
                "GHOSTOPS_STUDIO_MAX_ITERS",
                "GHOSTOPS_STUDIO_TTL_SECONDS",
                &get,
            )?,
            product_config(
                Product::PreBriefBoard,
                "STRIPE_PRICE_ID_PRE_BRIEF_BOARD",
                "GHOSTOPS_PRE_BRIEF_MAX_ITERS",
                "GHOSTOPS_PRE_BRIEF_TTL_SECONDS",
                &get,
            )?,
        ];

        Ok(Self {
            token_secret,
            public_origin: get("PUBLIC_SITE_ORIGIN")
                .map(|o| o.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:3000".into()),
            stripe,
            identity,
            generation,
            products,
        })
    }

    pub fn product(&self, product: Product) -> &ProductConfig {
        self.products
            .iter()
            .find(|p| p.product == product)
            .expect("all products configured")
    }
}

fn product_config(
    product: Product,
    price_var: &'static str,
    max_iters_var: &'static str,
    ttl_var: &'static str,
    get: &impl Fn(&'static str) -> Option<String>,
) -> Result<ProductConfig, ConfigError> {
    let defaults = SessionPolicy::default_for(product);
    Ok(ProductConfig {
        product,
        price_id: get(price_var),
        policy: SessionPolicy {
            max_uses: parse_or(max_iters_var, get, defaults.max_uses)?,
            ttl_seconds: parse_or(ttl_var, get, defaults.ttl_seconds)?,
        },
    })
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    get: &impl Fn(&'static str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
