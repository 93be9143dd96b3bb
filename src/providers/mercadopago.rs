use super::{
    IpnNotification, ProviderAdapter, ProviderOperation, ProviderRequest, parse_json,
    require_gateway_reference, required_str, str_at,
};
use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment, PaymentType};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// MercadoPago payments API (cards and tickets).
pub struct MercadoPagoAdapter;

fn translate_status(raw: &str, detail: Option<&str>, is_ticket: bool) -> Result<PaymentStatus> {
    let status = match raw {
        "approved" if detail == Some("partially_refunded") => PaymentStatus::PartialRefund,
        "approved" => PaymentStatus::Successful,
        "authorized" => PaymentStatus::Authorized,
        "in_process" => PaymentStatus::PendingAuthorize,
        "pending" if is_ticket => PaymentStatus::PendingCapture,
        "pending" => PaymentStatus::PendingAuthorize,
        "in_mediation" => PaymentStatus::InMediation,
        "rejected" => PaymentStatus::Rejected,
        "cancelled" => PaymentStatus::Cancelled,
        "refunded" => PaymentStatus::Refunded,
        "charged_back" => PaymentStatus::ChargedBack,
        other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
    };
    Ok(status)
}

fn translate_detail(raw: &str) -> Result<StatusDetail> {
    let detail = match raw {
        "accredited" => StatusDetail::Ok,
        "partially_refunded" => StatusDetail::PartialRefund,
        "pending_contingency" | "pending_capture" => StatusDetail::Pending,
        "pending_review_manual" => StatusDetail::PendingReview,
        "pending_waiting_payment" | "pending_waiting_transfer" => StatusDetail::PendingPayment,
        "cc_rejected_insufficient_amount" => StatusDetail::InsufficientFunds,
        "cc_rejected_bad_filled_card_number"
        | "cc_rejected_bad_filled_date"
        | "cc_rejected_bad_filled_security_code"
        | "cc_rejected_bad_filled_other" => StatusDetail::InvalidCard,
        "cc_rejected_card_disabled" => StatusDetail::CardDisabled,
        "cc_rejected_high_risk" | "cc_rejected_blacklist" => StatusDetail::RejectedByRisk,
        "cc_rejected_call_for_authorize" => StatusDetail::CallForAuthorize,
        "cc_rejected_duplicated_payment" => StatusDetail::Duplicated,
        "expired" => StatusDetail::Expired,
        "by_collector" => StatusDetail::MerchantCancelled,
        "by_payer" => StatusDetail::BuyerCancelled,
        "refunded" => StatusDetail::Refunded,
        "in_process" => StatusDetail::Pending,
        "settled" | "reimbursed" => StatusDetail::ChargedBack,
        other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
    };
    Ok(detail)
}

impl ProviderAdapter for MercadoPagoAdapter {
    fn provider(&self) -> Provider {
        Provider::MercadoPago
    }

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest> {
        let request = match operation {
            ProviderOperation::Create => {
                let mut body = json!({
                    "transaction_amount": payment.total(),
                    "currency_id": payment.currency,
                    "external_reference": payment.client_reference,
                    "installments": payment.installments,
                });
                if payment.r#type == PaymentType::Ticket {
                    body["payment_method_id"] = json!("bolbradesco");
                } else {
                    let token = instrument.and_then(|i| i.token.as_deref()).ok_or_else(|| {
                        PaymentError::ValidationError("card token is required".to_string())
                    })?;
                    body["token"] = json!(token);
                    body["capture"] = json!(false);
                }
                ProviderRequest::post(self.provider(), operation, "/v1/payments", body)
            }
            ProviderOperation::Capture => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v1/payments/{id}"),
                    json!({ "capture": true }),
                )
            }
            ProviderOperation::Void => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v1/payments/{id}"),
                    json!({ "status": "cancelled" }),
                )
            }
            ProviderOperation::Refund => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/v1/payments/{id}/refunds"),
                    json!({}),
                )
            }
            ProviderOperation::Execute | ProviderOperation::FetchToken => {
                return Err(PaymentError::InvalidParameters(format!(
                    "mercadoPago does not support {operation}"
                )));
            }
        };
        Ok(request)
    }

    fn gateway_reference(&self, data: &Value) -> Option<String> {
        match data.get("id")? {
            Value::Number(id) => Some(id.to_string()),
            Value::String(id) => Some(id.clone()),
            _ => None,
        }
    }

    fn payment_metadata(&self, data: &Value) -> Map<String, Value> {
        let mut metadata = Map::new();
        if let Some(url) = str_at(data, "/transaction_details/external_resource_url") {
            metadata.insert("ticketUrl".to_string(), json!(url));
        }
        if let Some(barcode) = str_at(data, "/barcode/content") {
            metadata.insert("barcode".to_string(), json!(barcode));
        }
        metadata
    }

    fn expiration_date(&self, data: &Value) -> Option<OffsetDateTime> {
        str_at(data, "/date_of_expiration").and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
    }

    fn translate_authorize_status(
        &self,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus> {
        let raw = required_str(data, "/status")?;
        // The refunds endpoint answers with the refund resource, not the payment.
        if operation == ProviderOperation::Refund && raw == "approved" {
            return Ok(PaymentStatus::Refunded);
        }
        let is_ticket = str_at(data, "/payment_type_id") == Some("ticket");
        translate_status(raw, str_at(data, "/status_detail"), is_ticket)
    }

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail> {
        translate_detail(required_str(data, "/status_detail")?)
    }

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>> {
        let body = parse_json(raw)?;
        let topic = str_at(&body, "/type").ok_or_else(|| {
            PaymentError::InvalidParameters("IPN payload without type".to_string())
        })?;
        if topic != "payment" {
            return Err(PaymentError::SkipIpn(format!(
                "mercadoPago notification of type {topic}"
            )));
        }
        let data = body.get("data").cloned().ok_or_else(|| {
            PaymentError::InvalidParameters("IPN payload without data".to_string())
        })?;
        let client_reference = str_at(&data, "/external_reference")
            .ok_or_else(|| {
                PaymentError::InvalidParameters("IPN payload without external_reference".into())
            })?
            .to_string();
        Ok(vec![IpnNotification {
            client_reference,
            payload: data,
        }])
    }

    fn translate_ipn_status(
        &self,
        payload: &Value,
        payment: &Payment,
        _history: &[StatusChange],
    ) -> Result<PaymentStatus> {
        translate_status(
            required_str(payload, "/status")?,
            str_at(payload, "/status_detail"),
            payment.r#type == PaymentType::Ticket,
        )
    }

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail> {
        translate_detail(required_str(payload, "/status_detail")?)
    }
}
