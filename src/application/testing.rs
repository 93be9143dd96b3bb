//! Fixtures shared by the application unit tests.

use super::services::{Services, ServicesRef};
use crate::config::{EngineSettings, Settings, TenantPaymentMethod, TenantSettings};
use crate::domain::gateway::{GatewayMethodConfig, Provider};
use crate::domain::order::{NewOrder, PaymentMethodKind, PaymentOrder};
use crate::domain::payment::{Currency, PaymentType};
use crate::domain::ports::{OrderStore, TenantNotifier};
use crate::error::Result;
use crate::infrastructure::in_memory::{
    InMemoryGatewayMethodStore, InMemoryIpnFailureLog, InMemoryOrderStore, InMemoryPaymentStore,
};
use crate::infrastructure::token_cache::TokenCache;
use crate::providers::{ProviderClient, ProviderOperation, ProviderRequest, ProviderResponse};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Answers provider calls from a per-operation queue; unscripted calls get a 500.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<HashMap<(Provider, ProviderOperation), VecDeque<ProviderResponse>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedClient {
    pub async fn push(&self, provider: Provider, operation: ProviderOperation, response: ProviderResponse) {
        self.script
            .lock()
            .await
            .entry((provider, operation))
            .or_default()
            .push_back(response);
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let key = (request.provider, request.operation);
        self.requests.lock().await.push(request);
        let scripted = self
            .script
            .lock()
            .await
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| match key.1 {
            ProviderOperation::FetchToken => {
                ProviderResponse::new(200, json!({ "access_token": "t-1", "expires_in": 3600 }))
            }
            _ => ProviderResponse::new(500, json!({ "message": "unscripted" })),
        }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<PaymentOrder>>,
}

#[async_trait]
impl TenantNotifier for RecordingNotifier {
    async fn order_status_changed(&self, order: &PaymentOrder) -> Result<()> {
        self.notified.lock().await.push(order.clone());
        Ok(())
    }
}

fn method_for(payment_type: PaymentType) -> PaymentMethodKind {
    match payment_type {
        PaymentType::CreditCard => PaymentMethodKind::CreditCard,
        PaymentType::Ticket => PaymentMethodKind::Ticket,
        PaymentType::Paypal => PaymentMethodKind::Paypal,
        PaymentType::Totvs => PaymentMethodKind::Totvs,
    }
}

/// Wires in-memory stores around `client` with tenant `acme` using every
/// method in `configs` in the given order, plus one order of that tenant.
pub fn services_with(
    client: Arc<ScriptedClient>,
    configs: Vec<GatewayMethodConfig>,
) -> (ServicesRef, PaymentOrder) {
    let (services, _) = services_with_notifier(client, configs);
    let order = NewOrder {
        tenant_id: "acme".to_string(),
        reference: "o-1".to_string(),
        payment_method: PaymentMethodKind::CreditCard,
        currency: Currency::Brl,
        total: dec!(100.00),
        instruments: vec![],
    }
    .into_order(1);
    (services, order)
}

pub fn services_with_notifier(
    client: Arc<ScriptedClient>,
    configs: Vec<GatewayMethodConfig>,
) -> (ServicesRef, Arc<RecordingNotifier>) {
    let mut payment_methods: Vec<TenantPaymentMethod> = Vec::new();
    for config in &configs {
        let method = method_for(config.kind.payment_type());
        match payment_methods.iter_mut().find(|entry| entry.method == method) {
            Some(entry) => entry.gateway_methods.push(config.id),
            None => payment_methods.push(TenantPaymentMethod {
                method,
                gateway_methods: vec![config.id],
            }),
        }
        if method == PaymentMethodKind::CreditCard {
            match payment_methods
                .iter_mut()
                .find(|entry| entry.method == PaymentMethodKind::TwoCreditCards)
            {
                Some(entry) => entry.gateway_methods.push(config.id),
                None => payment_methods.push(TenantPaymentMethod {
                    method: PaymentMethodKind::TwoCreditCards,
                    gateway_methods: vec![config.id],
                }),
            }
        }
    }
    let settings = Settings {
        engine: EngineSettings::default(),
        gateway_methods: configs,
        tenants: vec![TenantSettings {
            id: "acme".to_string(),
            payment_methods,
        }],
    };

    let notifier = Arc::new(RecordingNotifier::default());
    let services = Arc::new(Services {
        payments: Arc::new(InMemoryPaymentStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        gateway_methods: Arc::new(InMemoryGatewayMethodStore::from_settings(&settings)),
        ipn_failures: Arc::new(InMemoryIpnFailureLog::new()),
        notifier: notifier.clone(),
        tokens: Arc::new(TokenCache::new(&settings.engine, client.clone())),
        provider_client: client,
        settings: settings.engine,
    });
    (services, notifier)
}

/// Inserts `order` through the store so that it gets a real id.
pub async fn insert_order(services: &ServicesRef, order: NewOrder) -> PaymentOrder {
    services.orders.insert(order).await.unwrap()
}
