//! Shared application state.

use std::sync::Arc;

use crate::collaborators::{
    IdentityProvider, PaymentVerifier, ResponsesClient, StripeClient, SupabaseClient,
    TextGenerator,
};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub payments: Arc<dyn PaymentVerifier>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub generator: Arc<dyn TextGenerator>,
}

impl AppState {
    /// Production wiring: real HTTP clients for every collaborator.
    pub fn new(config: Config) -> Self {
        let payments = Arc::new(StripeClient::new(&config.stripe));
        let identity = config
            .identity
            .as_ref()
            .map(|c| Arc::new(SupabaseClient::new(c)) as Arc<dyn IdentityProvider>);
        let generator = Arc::new(ResponsesClient::new(&config.generation));
        Self {
            config: Arc::new(config),
            payments,
            identity,
            generator,
        }
    }

    /// Test wiring with arbitrary collaborator implementations.
    pub fn with_collaborators(
        config: Config,
        payments: Arc<dyn PaymentVerifier>,
        identity: Option<Arc<dyn IdentityProvider>>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            payments,
            identity,
            generator,
        }
    }
}
