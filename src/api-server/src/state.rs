use garm_authz::{ResourceMapper, UserMapper};
use garm_token::TokenManager;
use std::sync::Arc;

use crate::athenz::PolicyClient;

/// Collaborators shared by the webhook handlers
#[derive(Clone)]
pub struct AppState {
    /// Access-check translation
    pub resource_mapper: Arc<dyn ResourceMapper>,

    /// Policy identity to cluster user
    pub user_mapper: Arc<dyn UserMapper>,

    /// Outbound policy-service calls
    pub policy: Arc<dyn PolicyClient>,

    /// Credential for outbound calls
    pub tokens: Arc<TokenManager>,
}

impl AppState {
    pub fn new(
        resource_mapper: Arc<dyn ResourceMapper>,
        user_mapper: Arc<dyn UserMapper>,
        policy: Arc<dyn PolicyClient>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            resource_mapper,
            user_mapper,
            policy,
            tokens,
        }
    }
}
