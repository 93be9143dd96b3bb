use super::{
    IpnNotification, ProviderAdapter, ProviderOperation, ProviderRequest, parse_json,
    require_gateway_reference, required_str, str_at,
};
use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use serde_json::{Value, json};

/// Totvs ERP receivables. Payment happens offline; the ERP settles titles
/// and reports them back in batches.
pub struct TotvsAdapter;

impl ProviderAdapter for TotvsAdapter {
    fn provider(&self) -> Provider {
        Provider::Totvs
    }

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        _instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest> {
        match operation {
            ProviderOperation::Create => Ok(ProviderRequest::post(
                self.provider(),
                operation,
                "/api/fin/v1/titulos",
                json!({
                    "referencia": payment.client_reference,
                    "valor": payment.total(),
                    "parcelas": payment.installments,
                }),
            )),
            ProviderOperation::Refund => {
                let id = require_gateway_reference(payment, operation)?;
                Ok(ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/api/fin/v1/titulos/{id}/estorno"),
                    json!({}),
                ))
            }
            _ => Err(PaymentError::InvalidParameters(format!(
                "totvs does not support {operation}"
            ))),
        }
    }

    fn gateway_reference(&self, data: &Value) -> Option<String> {
        str_at(data, "/id").map(str::to_string)
    }

    fn translate_authorize_status(
        &self,
        _operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus> {
        let status = match required_str(data, "/situacao")? {
            "PENDENTE" => PaymentStatus::PendingCapture,
            "APROVADO" => PaymentStatus::Successful,
            "REPROVADO" => PaymentStatus::Rejected,
            "ESTORNADO" => PaymentStatus::Refunded,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(status)
    }

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail> {
        let detail = match required_str(data, "/situacao")? {
            "PENDENTE" => StatusDetail::PendingPayment,
            "APROVADO" => StatusDetail::Ok,
            "REPROVADO" => StatusDetail::InvalidBuyerData,
            "ESTORNADO" => StatusDetail::Refunded,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(detail)
    }

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>> {
        let body = parse_json(raw)?;
        let titles = body.get("titulos").and_then(Value::as_array).ok_or_else(|| {
            PaymentError::InvalidParameters("IPN payload without titulos".to_string())
        })?;
        titles
            .iter()
            .map(|title| {
                let client_reference = str_at(title, "/referencia")
                    .ok_or_else(|| {
                        PaymentError::InvalidParameters("titulo without referencia".into())
                    })?
                    .to_string();
                Ok(IpnNotification {
                    client_reference,
                    payload: title.clone(),
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
        let status = match required_str(payload, "/situacao")? {
            "BAIXADO" => PaymentStatus::Successful,
            "CANCELADO" => PaymentStatus::Cancelled,
            "ESTORNADO" => PaymentStatus::Refunded,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(status)
    }

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail> {
        let detail = match required_str(payload, "/situacao")? {
            "BAIXADO" => StatusDetail::Ok,
            "CANCELADO" => StatusDetail::MerchantCancelled,
            "ESTORNADO" => StatusDetail::Refunded,
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(detail)
    }
}
