use super::gateway_method::GatewayMethod;
use super::transition::TransitionEngine;
use crate::config::EngineSettings;
use crate::domain::gateway::GatewayMethodId;
use crate::domain::ports::{
    GatewayMethodStoreRef, IpnFailureLogRef, OrderStoreRef, PaymentStoreRef, TenantNotifierRef,
};
use crate::error::{PaymentError, Result};
use crate::infrastructure::token_cache::TokenCache;
use crate::providers::ProviderClientRef;
use std::sync::Arc;

/// Everything the application layer needs from the outside world.
pub struct Services {
    pub payments: PaymentStoreRef,
    pub orders: OrderStoreRef,
    pub gateway_methods: GatewayMethodStoreRef,
    pub ipn_failures: IpnFailureLogRef,
    pub notifier: TenantNotifierRef,
    pub provider_client: ProviderClientRef,
    pub tokens: Arc<TokenCache>,
    pub settings: EngineSettings,
}

pub type ServicesRef = Arc<Services>;

impl Services {
    pub fn transitions(&self) -> TransitionEngine {
        TransitionEngine::new(self.payments.clone())
    }

    /// Binds the configuration of gateway method `id` to its provider adapter.
    pub async fn gateway_method(self: &Arc<Self>, id: GatewayMethodId) -> Result<GatewayMethod> {
        let config = self
            .gateway_methods
            .get(id)
            .await?
            .ok_or(PaymentError::GatewayMethodNotFound(id))?;
        Ok(GatewayMethod::new(config, self.clone()))
    }
}
