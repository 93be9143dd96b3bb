#![allow(dead_code)]

use async_trait::async_trait;
use payorch::application::engine::PaymentEngine;
use payorch::application::services::{Services, ServicesRef};
use payorch::config::Settings;
use payorch::domain::gateway::Provider;
use payorch::domain::order::{NewOrder, PaymentMethodKind, PaymentOrder};
use payorch::domain::payment::{Amount, Currency, Instrument, PaymentType};
use payorch::domain::ports::TenantNotifier;
use payorch::error::Result;
use payorch::infrastructure::in_memory::{
    InMemoryGatewayMethodStore, InMemoryIpnFailureLog, InMemoryOrderStore, InMemoryPaymentStore,
};
use payorch::infrastructure::token_cache::TokenCache;
use payorch::providers::{ProviderClient, ProviderOperation, ProviderRequest, ProviderResponse};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Answers from per-operation queues. Unscripted calls get a 500, except token
/// requests which always succeed.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<HashMap<(Provider, ProviderOperation), VecDeque<ProviderResponse>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn push(&self, provider: Provider, operation: ProviderOperation, status: u16, data: Value) {
        self.script
            .lock()
            .await
            .entry((provider, operation))
            .or_default()
            .push_back(ProviderResponse::new(status, data));
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn count(&self, provider: Provider, operation: ProviderOperation) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.provider == provider && r.operation == operation)
            .count()
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let key = (request.provider, request.operation);
        self.requests.lock().await.push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .script
            .lock()
            .await
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| match key.1 {
            ProviderOperation::FetchToken => ProviderResponse::new(
                200,
                json!({ "access_token": "A21AA-test", "expires_in": 32400 }),
            ),
            _ => ProviderResponse::new(500, json!({ "message": "unscripted" })),
        }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<PaymentOrder>>,
}

impl RecordingNotifier {
    pub async fn notified(&self) -> Vec<PaymentOrder> {
        self.notified.lock().await.clone()
    }
}

#[async_trait]
impl TenantNotifier for RecordingNotifier {
    async fn order_status_changed(&self, order: &PaymentOrder) -> Result<()> {
        self.notified.lock().await.push(order.clone());
        Ok(())
    }
}

pub const CYBERSOURCE_CARD: u64 = 1;
pub const MERCADO_PAGO_CARD: u64 = 2;
pub const MERCADO_PAGO_TICKET: u64 = 3;
pub const BRADESCO_TICKET: u64 = 4;
pub const PAYPAL_WALLET: u64 = 5;
pub const TOTVS_OFFLINE: u64 = 6;

/// Tenant `acme` with every provider configured, and `globex` with boleto only.
pub fn settings() -> Settings {
    Settings::from_json(
        r#"{
        "engine": { "providerTimeoutMs": 200, "ipnFailureThreshold": 3 },
        "gatewayMethods": [
            { "id": 1, "kind": "cybersourceCard", "encryptionType": "cybersource",
              "interestRates": [{ "installments": 1, "rate": "0" }, { "installments": 3, "rate": "0.0399" }] },
            { "id": 2, "kind": "mercadoPagoCard", "encryptionType": "mercadoPago",
              "interestRates": [{ "installments": 1, "rate": "0" }] },
            { "id": 3, "kind": "mercadoPagoTicket" },
            { "id": 4, "kind": "bradescoTicket" },
            { "id": 5, "kind": "paypalWallet", "credentials": { "clientId": "acme-pp", "clientSecret": "s3cret" } },
            { "id": 6, "kind": "totvsOffline" }
        ],
        "tenants": [{
            "id": "acme",
            "paymentMethods": [
                { "method": "creditCard", "gatewayMethods": [1, 2] },
                { "method": "twoCreditCards", "gatewayMethods": [1, 2] },
                { "method": "ticket", "gatewayMethods": [4, 3] },
                { "method": "paypal", "gatewayMethods": [5] },
                { "method": "totvs", "gatewayMethods": [6] }
            ]
        }, {
            "id": "globex",
            "paymentMethods": [{ "method": "ticket", "gatewayMethods": [4] }]
        }]
    }"#,
    )
    .unwrap()
}

pub struct Harness {
    pub engine: PaymentEngine,
    pub services: ServicesRef,
    pub client: Arc<ScriptedClient>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    harness_with(settings(), ScriptedClient::default())
}

pub fn harness_with(settings: Settings, client: ScriptedClient) -> Harness {
    let client = Arc::new(client);
    let notifier = Arc::new(RecordingNotifier::default());
    let services = Arc::new(Services {
        payments: Arc::new(InMemoryPaymentStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        gateway_methods: Arc::new(InMemoryGatewayMethodStore::from_settings(&settings)),
        ipn_failures: Arc::new(InMemoryIpnFailureLog::new()),
        notifier: notifier.clone(),
        tokens: Arc::new(TokenCache::new(&settings.engine, client.clone())),
        provider_client: client.clone(),
        settings: settings.engine,
    });
    Harness {
        engine: PaymentEngine::new(services.clone()),
        services,
        client,
        notifier,
    }
}

pub fn card(amount: Decimal, token: &str) -> Instrument {
    Instrument {
        r#type: PaymentType::CreditCard,
        amount: Amount::new(amount).unwrap(),
        interest: dec!(0),
        installments: 1,
        token: Some(token.to_string()),
        encryption_type: None,
        return_url: None,
    }
}

pub fn ticket(amount: Decimal) -> Instrument {
    Instrument {
        r#type: PaymentType::Ticket,
        amount: Amount::new(amount).unwrap(),
        interest: dec!(0),
        installments: 1,
        token: None,
        encryption_type: None,
        return_url: None,
    }
}

pub fn wallet(amount: Decimal) -> Instrument {
    Instrument {
        r#type: PaymentType::Paypal,
        amount: Amount::new(amount).unwrap(),
        interest: dec!(0),
        installments: 1,
        token: None,
        encryption_type: None,
        return_url: Some("https://shop.acme.test/return".to_string()),
    }
}

pub fn offline(amount: Decimal) -> Instrument {
    Instrument {
        r#type: PaymentType::Totvs,
        amount: Amount::new(amount).unwrap(),
        interest: dec!(0),
        installments: 1,
        token: None,
        encryption_type: None,
        return_url: None,
    }
}

pub fn new_order(reference: &str, payment_method: PaymentMethodKind, instruments: Vec<Instrument>) -> NewOrder {
    tenant_order("acme", reference, payment_method, instruments)
}

pub fn tenant_order(
    tenant: &str,
    reference: &str,
    payment_method: PaymentMethodKind,
    instruments: Vec<Instrument>,
) -> NewOrder {
    let total = instruments.iter().map(|i| i.amount.value()).sum();
    NewOrder {
        tenant_id: tenant.to_string(),
        reference: reference.to_string(),
        payment_method,
        currency: Currency::Brl,
        total,
        instruments,
    }
}

/// Creates and processes an order, ignoring processing errors.
pub async fn processed(harness: &Harness, order: NewOrder) -> PaymentOrder {
    let created = harness.engine.create_payment_order(order).await.unwrap();
    let _ = harness.engine.process_payment_order(created.id).await;
    harness
        .services
        .orders
        .get(created.id)
        .await
        .unwrap()
        .unwrap()
}

pub fn mp_card(status: &str, detail: &str, id: u64) -> Value {
    json!({ "id": id, "status": status, "status_detail": detail, "payment_type_id": "credit_card" })
}
