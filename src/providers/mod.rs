//! Provider adapters: translation between each external gateway's native
//! vocabulary and the canonical status model.
//!
//! Adapters are stateless and never decide *when* a transition happens; the
//! gateway method drives them.

pub mod bradesco;
pub mod cybersource;
pub mod mercadopago;
pub mod paypal;
pub mod totvs;

use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use strum::Display;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ProviderOperation {
    Create,
    Capture,
    Void,
    Refund,
    Execute,
    FetchToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    pub provider: Provider,
    pub operation: ProviderOperation,
    pub method: HttpMethod,
    pub path: String,
    pub body: Value,
    pub bearer_token: Option<String>,
}

impl ProviderRequest {
    pub fn post(
        provider: Provider,
        operation: ProviderOperation,
        path: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            provider,
            operation,
            method: HttpMethod::Post,
            path: path.into(),
            body,
            bearer_token: None,
        }
    }
}

/// What the core needs from a provider HTTP answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub data: Value,
}

impl ProviderResponse {
    pub fn new(status_code: u16, data: Value) -> Self {
        Self { status_code, data }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// HTTP transport to the providers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse>;
}

pub type ProviderClientRef = Arc<dyn ProviderClient>;

/// One payment-level notification extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct IpnNotification {
    pub client_reference: String,
    pub payload: Value,
}

/// Wire-level acknowledgement returned to the webhook sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpnResponse {
    pub status_code: u16,
    pub body: Value,
}

impl IpnResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest>;

    /// OAuth token endpoint, for providers that authenticate with bearer tokens.
    fn token_endpoint(&self) -> Option<&'static str> {
        None
    }

    fn is_retryable(&self, response: &ProviderResponse) -> bool {
        response.status_code >= 500 || response.status_code == 429
    }

    fn gateway_reference(&self, data: &Value) -> Option<String>;

    fn payment_metadata(&self, _data: &Value) -> Map<String, Value> {
        Map::new()
    }

    fn expiration_date(&self, _data: &Value) -> Option<OffsetDateTime> {
        None
    }

    fn translate_authorize_status(
        &self,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus>;

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail>;

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>>;

    fn translate_ipn_status(
        &self,
        payload: &Value,
        payment: &Payment,
        history: &[StatusChange],
    ) -> Result<PaymentStatus>;

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail>;

    fn ipn_success_response(&self) -> IpnResponse {
        IpnResponse::ok()
    }

    fn ipn_fail_response(&self, error: &PaymentError) -> IpnResponse {
        let status_code = match error.http_status() {
            code if code >= 400 => code,
            _ => 500,
        };
        IpnResponse {
            status_code,
            body: json!({ "code": error.code() }),
        }
    }
}

/// Selects the adapter for `provider`.
pub fn adapter_for(provider: Provider) -> Box<dyn ProviderAdapter> {
    match provider {
        Provider::Cybersource => Box::new(cybersource::CybersourceAdapter),
        Provider::MercadoPago => Box::new(mercadopago::MercadoPagoAdapter),
        Provider::Paypal => Box::new(paypal::PaypalAdapter),
        Provider::Bradesco => Box::new(bradesco::BradescoAdapter),
        Provider::Totvs => Box::new(totvs::TotvsAdapter),
    }
}

pub(crate) fn str_at<'a>(data: &'a Value, pointer: &str) -> Option<&'a str> {
    data.pointer(pointer).and_then(Value::as_str)
}

/// Reads a required string field or fails with a miss on `pointer`.
pub(crate) fn required_str<'a>(data: &'a Value, pointer: &str) -> Result<&'a str> {
    str_at(data, pointer).ok_or_else(|| PaymentError::NoMatchingStatus(format!("missing {pointer}")))
}

pub(crate) fn parse_json(raw: &[u8]) -> Result<Value> {
    serde_json::from_slice(raw)
        .map_err(|e| PaymentError::InvalidParameters(format!("malformed IPN payload: {e}")))
}

pub(crate) fn require_gateway_reference<'a>(
    payment: &'a Payment,
    operation: ProviderOperation,
) -> Result<&'a str> {
    payment.gateway_reference.as_deref().ok_or_else(|| {
        PaymentError::InvalidActionForCurrentPaymentStatus {
            action: match operation {
                ProviderOperation::Capture => "capture",
                ProviderOperation::Void => "void",
                ProviderOperation::Refund => "refund",
                ProviderOperation::Execute => "execute",
                _ => "operate on",
            },
            status: payment.status,
        }
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::payment::{
        Amount, ClientReference, Currency, Instrument, NewPayment, Payment, PaymentType,
    };
    use rust_decimal_macros::dec;

    pub fn payment(r#type: PaymentType) -> Payment {
        NewPayment {
            order_id: 1,
            gateway_method_id: 1,
            client_reference: ClientReference::first("order-1"),
            amount: Amount::new(dec!(150.00)).unwrap(),
            interest: dec!(0),
            currency: Currency::Brl,
            installments: 1,
            r#type,
        }
        .into_payment(1)
    }

    pub fn instrument(r#type: PaymentType, token: &str) -> Instrument {
        Instrument {
            r#type,
            amount: Amount::new(dec!(150.00)).unwrap(),
            interest: dec!(0),
            installments: 1,
            token: Some(token.to_string()),
            encryption_type: None,
            return_url: Some("https://shop.example/return".to_string()),
        }
    }
}
