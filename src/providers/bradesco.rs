use super::{
    IpnNotification, IpnResponse, ProviderAdapter, ProviderOperation, ProviderRequest,
    ProviderResponse, parse_json, require_gateway_reference, required_str, str_at,
};
use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use serde_json::{Map, Value, json};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Bradesco boleto registration.
pub struct BradescoAdapter;

const REGISTERED: &str = "0";
const UNAVAILABLE: &str = "-399";

impl ProviderAdapter for BradescoAdapter {
    fn provider(&self) -> Provider {
        Provider::Bradesco
    }

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        _instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest> {
        let request = match operation {
            ProviderOperation::Create => ProviderRequest::post(
                self.provider(),
                operation,
                "/boleto/registro",
                json!({
                    "numero": payment.client_reference,
                    "valor": payment.total(),
                    "moeda": payment.currency,
                }),
            ),
            ProviderOperation::Void => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    "/boleto/cancelamento",
                    json!({ "nosso_numero": id }),
                )
            }
            ProviderOperation::Refund => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    "/boleto/estorno",
                    json!({ "nosso_numero": id, "valor": payment.total() }),
                )
            }
            ProviderOperation::Capture
            | ProviderOperation::Execute
            | ProviderOperation::FetchToken => {
                return Err(PaymentError::InvalidParameters(format!(
                    "bradesco does not support {operation}"
                )));
            }
        };
        Ok(request)
    }

    fn is_retryable(&self, response: &ProviderResponse) -> bool {
        response.status_code >= 500
            || response.status_code == 429
            || str_at(&response.data, "/status/codigo") == Some(UNAVAILABLE)
    }

    fn gateway_reference(&self, data: &Value) -> Option<String> {
        str_at(data, "/boleto/nosso_numero").map(str::to_string)
    }

    fn payment_metadata(&self, data: &Value) -> Map<String, Value> {
        let mut metadata = Map::new();
        if let Some(line) = str_at(data, "/boleto/linha_digitavel") {
            metadata.insert("barcode".to_string(), json!(line));
        }
        if let Some(url) = str_at(data, "/boleto/url_acesso") {
            metadata.insert("ticketUrl".to_string(), json!(url));
        }
        metadata
    }

    fn expiration_date(&self, data: &Value) -> Option<OffsetDateTime> {
        let raw = str_at(data, "/boleto/data_vencimento")?;
        Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .ok()
            .map(|date| date.midnight().assume_utc())
    }

    fn translate_authorize_status(
        &self,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus> {
        let code = required_str(data, "/status/codigo")?;
        let status = match (operation, code) {
            (ProviderOperation::Void, REGISTERED) => PaymentStatus::Cancelled,
            (ProviderOperation::Refund, REGISTERED) => PaymentStatus::Refunded,
            (_, REGISTERED) => PaymentStatus::PendingCapture,
            _ => PaymentStatus::Rejected,
        };
        Ok(status)
    }

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail> {
        let detail = match required_str(data, "/status/codigo")? {
            REGISTERED if data.pointer("/boleto").is_some() => StatusDetail::PendingPayment,
            REGISTERED => StatusDetail::Ok,
            UNAVAILABLE => StatusDetail::GatewayUnavailable,
            _ => StatusDetail::InvalidBuyerData,
        };
        Ok(detail)
    }

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>> {
        let body = parse_json(raw)?;
        let orders = body.get("pedidos").and_then(Value::as_array).ok_or_else(|| {
            PaymentError::InvalidParameters("IPN payload without pedidos".to_string())
        })?;
        orders
            .iter()
            .map(|entry| {
                let client_reference = required_str(entry, "/numero")
                    .map_err(|_| PaymentError::InvalidParameters("pedido without numero".into()))?
                    .to_string();
                Ok(IpnNotification {
                    client_reference,
                    payload: entry.clone(),
                })
            })
            .collect()
    }

    fn translate_ipn_status(
        &self,
        payload: &Value,
        _payment: &Payment,
        _history: &[StatusChange],
    ) -> Result<PaymentStatus> {
        let status = match required_str(payload, "/status")? {
            "pago" => PaymentStatus::Successful,
            "vencido" | "cancelado" => PaymentStatus::Cancelled,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(status)
    }

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail> {
        let detail = match required_str(payload, "/status")? {
            "pago" => StatusDetail::Ok,
            "vencido" => StatusDetail::Expired,
            "cancelado" => StatusDetail::MerchantCancelled,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(detail)
    }

    fn ipn_success_response(&self) -> IpnResponse {
        IpnResponse {
            status_code: 200,
            body: json!({ "retorno": "OK" }),
        }
    }

    fn ipn_fail_response(&self, error: &PaymentError) -> IpnResponse {
        let status_code = match error.http_status() {
            code if code >= 400 => code,
            _ => 500,
        };
        IpnResponse {
            status_code,
            body: json!({ "retorno": "ERRO", "codigo": error.code() }),
        }
    }
}
