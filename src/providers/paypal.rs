use super::{
    IpnNotification, ProviderAdapter, ProviderOperation, ProviderRequest, parse_json,
    require_gateway_reference, required_str, str_at,
};
use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail, history_contains};
use crate::error::{PaymentError, Result};
use serde_json::{Map, Value, json};

/// PayPal orders API (wallet). Authenticates with OAuth bearer tokens.
pub struct PaypalAdapter;

const CAPTURE_STATUS: &str = "/purchase_units/0/payments/captures/0/status";
const CAPTURE_ID: &str = "/purchase_units/0/payments/captures/0/id";

/// Capture status when the answer embeds one, otherwise the order status.
fn effective_status(data: &Value) -> Result<&str> {
    match str_at(data, CAPTURE_STATUS) {
        Some(status) => Ok(status),
        None => required_str(data, "/status"),
    }
}

fn approval_url(data: &Value) -> Option<&str> {
    data.get("links")?
        .as_array()?
        .iter()
        .find(|link| matches!(str_at(link, "/rel"), Some("approve" | "payer-action")))
        .and_then(|link| str_at(link, "/href"))
}

fn ipn_reference(body: &Value) -> Option<&str> {
    str_at(body, "/resource/invoice_id")
        .or_else(|| str_at(body, "/resource/disputed_transactions/0/invoice_number"))
}

impl ProviderAdapter for PaypalAdapter {
    fn provider(&self) -> Provider {
        Provider::Paypal
    }

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest> {
        let request = match operation {
            ProviderOperation::Create => {
                let return_url = instrument.and_then(|i| i.return_url.as_deref()).ok_or_else(|| {
                    PaymentError::ValidationError("wallet payments need a return url".to_string())
                })?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    "/v2/checkout/orders",
                    json!({
                        "intent": "CAPTURE",
                        "purchase_units": [{
                            "invoice_id": payment.client_reference,
                            "amount": {
                                "currency_code": payment.currency,
                                "value": payment.total(),
                            },
                        }],
                        "application_context": { "return_url": return_url },
                    }),
                )
            }
            ProviderOperation::Execute => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v2/checkout/orders/{id}/capture"),
                    json!({}),
                )
            }
            ProviderOperation::Void => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v2/payments/authorizations/{id}/void"),
                    json!({}),
                )
            }
            ProviderOperation::Refund => {
                let id = match payment.metadata.get("captureId").and_then(Value::as_str) {
                    Some(capture) => capture,
                    None => require_gateway_reference(payment, operation)?,
                };
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v2/payments/captures/{id}/refund"),
                    json!({
                        "invoice_id": payment.client_reference,
                        "amount": {
                            "currency_code": payment.currency,
                            "value": payment.total(),
                        },
                    }),
                )
            }
            ProviderOperation::Capture | ProviderOperation::FetchToken => {
                return Err(PaymentError::InvalidParameters(format!(
                    "paypal does not support {operation}"
                )));
            }
        };
        Ok(request)
    }

    fn token_endpoint(&self) -> Option<&'static str> {
        Some("/v1/oauth2/token")
    }

    fn gateway_reference(&self, data: &Value) -> Option<String> {
        str_at(data, "/id").map(str::to_string)
    }

    fn payment_metadata(&self, data: &Value) -> Map<String, Value> {
        let mut metadata = Map::new();
        if let Some(url) = approval_url(data) {
            metadata.insert("approvalUrl".to_string(), json!(url));
        }
        if let Some(capture) = str_at(data, CAPTURE_ID) {
            metadata.insert("captureId".to_string(), json!(capture));
        }
        metadata
    }

    fn translate_authorize_status(
        &self,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus> {
        let raw = effective_status(data)?;
        let status = match (operation, raw) {
            (ProviderOperation::Refund, "COMPLETED") => PaymentStatus::Refunded,
            (ProviderOperation::Refund, "PENDING") => PaymentStatus::PendingCancel,
            (_, "CREATED" | "PAYER_ACTION_REQUIRED") => PaymentStatus::PendingClientAction,
            (_, "APPROVED") => PaymentStatus::PendingExecute,
            (_, "COMPLETED") => PaymentStatus::Successful,
            (_, "PENDING") => PaymentStatus::PendingAuthorize,
            (_, "DECLINED" | "FAILED") => PaymentStatus::Rejected,
            (_, "VOIDED") => PaymentStatus::Cancelled,
            (_, other) => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(status)
    }

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail> {
        let detail = match effective_status(data)? {
            "COMPLETED" => StatusDetail::Ok,
            "CREATED" | "PAYER_ACTION_REQUIRED" => StatusDetail::PendingPayment,
            "APPROVED" | "PENDING" => StatusDetail::Pending,
            "VOIDED" => StatusDetail::MerchantCancelled,
            "DECLINED" | "FAILED" => match str_at(data, "/details/0/issue") {
                Some("INSTRUMENT_DECLINED") => StatusDetail::InvalidCard,
                Some("PAYER_CANNOT_PAY") => StatusDetail::InsufficientFunds,
                Some("DUPLICATE_INVOICE_ID") => StatusDetail::Duplicated,
                _ => StatusDetail::RejectedByRisk,
            },
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(detail)
    }

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>> {
        let body = parse_json(raw)?;
        let event = str_at(&body, "/event_type").ok_or_else(|| {
            PaymentError::InvalidParameters("IPN payload without event_type".to_string())
        })?;
        let relevant = event.starts_with("PAYMENT.CAPTURE.")
            || event.starts_with("PAYMENT.AUTHORIZATION.")
            || event.starts_with("CUSTOMER.DISPUTE.");
        if !relevant {
            return Err(PaymentError::SkipIpn(format!("paypal event {event}")));
        }
        let client_reference = ipn_reference(&body)
            .ok_or_else(|| PaymentError::InvalidParameters("IPN payload without invoice id".into()))?
            .to_string();
        Ok(vec![IpnNotification {
            client_reference,
            payload: body,
        }])
    }

    fn translate_ipn_status(
        &self,
        payload: &Value,
        payment: &Payment,
        history: &[StatusChange],
    ) -> Result<PaymentStatus> {
        let reached = |statuses: &[PaymentStatus]| {
            statuses.contains(&payment.status) || history_contains(history, statuses)
        };
        let status = match required_str(payload, "/event_type")? {
            "PAYMENT.CAPTURE.COMPLETED" => PaymentStatus::Successful,
            "PAYMENT.CAPTURE.PENDING" => PaymentStatus::PendingAuthorize,
            "PAYMENT.CAPTURE.DENIED" => PaymentStatus::Rejected,
            "PAYMENT.CAPTURE.REFUNDED" => PaymentStatus::Refunded,
            "PAYMENT.AUTHORIZATION.VOIDED" => PaymentStatus::Cancelled,
            // Reversal means a refund, a void or a failed capture depending
            // on how far the payment got.
            "PAYMENT.CAPTURE.REVERSED" => {
                if reached(&[PaymentStatus::Successful]) {
                    PaymentStatus::Refunded
                } else if reached(&[PaymentStatus::Authorized, PaymentStatus::PendingAuthorize]) {
                    PaymentStatus::Cancelled
                } else {
                    PaymentStatus::Rejected
                }
            }
            "CUSTOMER.DISPUTE.CREATED" => PaymentStatus::InMediation,
            "CUSTOMER.DISPUTE.RESOLVED" => {
                match required_str(payload, "/resource/dispute_outcome/outcome_code")? {
                    "RESOLVED_BUYER_FAVOUR" => PaymentStatus::ChargedBack,
                    "RESOLVED_SELLER_FAVOUR" => PaymentStatus::Successful,
                    other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
                }
            }
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(status)
    }

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail> {
        let detail = match required_str(payload, "/event_type")? {
            "PAYMENT.CAPTURE.COMPLETED" => StatusDetail::Ok,
            "PAYMENT.CAPTURE.PENDING" => StatusDetail::Pending,
            "PAYMENT.CAPTURE.DENIED" => StatusDetail::RejectedByRisk,
            "PAYMENT.CAPTURE.REFUNDED" => StatusDetail::Refunded,
            "PAYMENT.AUTHORIZATION.VOIDED" => StatusDetail::MerchantCancelled,
            "CUSTOMER.DISPUTE.CREATED" => StatusDetail::InMediation,
            "CUSTOMER.DISPUTE.RESOLVED" => {
                match str_at(payload, "/resource/dispute_outcome/outcome_code") {
                    Some("RESOLVED_BUYER_FAVOUR") => StatusDetail::ChargedBack,
                    _ => StatusDetail::Ok,
                }
            }
            other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
        };
        Ok(detail)
    }
}
