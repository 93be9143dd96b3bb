use super::{
    IpnNotification, ProviderAdapter, ProviderOperation, ProviderRequest, ProviderResponse,
    parse_json, require_gateway_reference, required_str, str_at,
};
use crate::domain::gateway::Provider;
use crate::domain::payment::{Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use serde_json::{Value, json};

/// Cybersource REST payments (cards).
pub struct CybersourceAdapter;

const RETRYABLE_REASONS: &[&str] = &[
    "SYSTEM_ERROR",
    "SERVER_TIMEOUT",
    "SERVICE_TIMEOUT",
    "PROCESSOR_UNAVAILABLE",
];

fn translate_status(raw: &str, risk_decision: Option<&str>) -> Result<PaymentStatus> {
    let status = match raw {
        "AUTHORIZED" if risk_decision == Some("REVIEW") => PaymentStatus::PendingAuthorize,
        "AUTHORIZED" => PaymentStatus::Authorized,
        "AUTHORIZED_PENDING_REVIEW" | "PENDING_REVIEW" => PaymentStatus::PendingAuthorize,
        "DECLINED" | "AUTHORIZED_RISK_DECLINED" | "INVALID_REQUEST" => PaymentStatus::Rejected,
        "PENDING" => PaymentStatus::PendingCapture,
        "TRANSMITTED" | "SETTLED" => PaymentStatus::Successful,
        "REVERSED" | "VOIDED" => PaymentStatus::Cancelled,
        "REFUNDED" => PaymentStatus::Refunded,
        other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
    };
    Ok(status)
}

fn translate_reason(raw: &str) -> Result<StatusDetail> {
    let detail = match raw {
        "INSUFFICIENT_FUND" => StatusDetail::InsufficientFunds,
        "INVALID_ACCOUNT" | "INVALID_DATA" | "CARD_TYPE_NOT_ACCEPTED" | "INVALID_CVN" => {
            StatusDetail::InvalidCard
        }
        "EXPIRED_CARD" => StatusDetail::Expired,
        "STOLEN_LOST_CARD" | "ACCOUNT_FROZEN" => StatusDetail::CardDisabled,
        "DECISION_PROFILE_REJECT" | "SCORE_EXCEEDS_THRESHOLD" => StatusDetail::RejectedByRisk,
        "CONTACT_PROCESSOR" | "PROCESSOR_DECLINED" => StatusDetail::CallForAuthorize,
        "DUPLICATE_REQUEST" => StatusDetail::Duplicated,
        "MISSING_FIELD" | "INVALID_MERCHANT_CONFIGURATION" => StatusDetail::InvalidBuyerData,
        "SYSTEM_ERROR" | "SERVER_TIMEOUT" | "SERVICE_TIMEOUT" | "PROCESSOR_UNAVAILABLE" => {
            StatusDetail::GatewayUnavailable
        }
        "DECISION_PROFILE_REVIEW" => StatusDetail::PendingReview,
        other => return Err(PaymentError::NoMatchingStatus(other.to_string())),
    };
    Ok(detail)
}

/// Successful answers carry no error reason; the status alone decides.
fn detail_from(data: &Value) -> Result<StatusDetail> {
    if let Some(reason) = str_at(data, "/errorInformation/reason") {
        return translate_reason(reason);
    }
    let detail = match required_str(data, "/status")? {
        "AUTHORIZED" if str_at(data, "/riskInformation/profile/decision") == Some("REVIEW") => {
            StatusDetail::PendingReview
        }
        "AUTHORIZED_PENDING_REVIEW" | "PENDING_REVIEW" => StatusDetail::PendingReview,
        "PENDING" => StatusDetail::Pending,
        "REFUNDED" => StatusDetail::Refunded,
        _ => StatusDetail::Ok,
    };
    Ok(detail)
}

fn event_status(event: &str) -> Option<PaymentStatus> {
    let status = match event {
        "payments.decision.accept" => PaymentStatus::Authorized,
        "payments.decision.review" => PaymentStatus::PendingAuthorize,
        "payments.decision.reject" => PaymentStatus::Rejected,
        "payments.capture.settled" => PaymentStatus::Successful,
        "payments.void.accept" => PaymentStatus::Cancelled,
        "payments.refund.settled" => PaymentStatus::Refunded,
        "payments.chargeback.created" => PaymentStatus::ChargedBack,
        _ => return None,
    };
    Some(status)
}

impl ProviderAdapter for CybersourceAdapter {
    fn provider(&self) -> Provider {
        Provider::Cybersource
    }

    fn build_request(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
        instrument: Option<&Instrument>,
    ) -> Result<ProviderRequest> {
        let amount_details = json!({
            "totalAmount": payment.total(),
            "currency": payment.currency,
        });
        let reference = json!({ "code": payment.client_reference });
        let request = match operation {
            ProviderOperation::Create => {
                let token = instrument.and_then(|i| i.token.as_deref()).ok_or_else(|| {
                    PaymentError::ValidationError("card token is required".to_string())
                })?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    "/pts/v2/payments",
                    json!({
                        "clientReferenceInformation": reference,
                        "tokenInformation": { "transientTokenJwt": token },
                        "orderInformation": { "amountDetails": amount_details },
                        "installmentInformation": { "totalCount": payment.installments },
                    }),
                )
            }
            ProviderOperation::Capture => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/pts/v2/payments/{id}/captures"),
                    json!({
                        "clientReferenceInformation": reference,
                        "orderInformation": { "amountDetails": amount_details },
                    }),
                )
            }
            ProviderOperation::Void => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/pts/v2/payments/{id}/reversals"),
                    json!({
                        "clientReferenceInformation": reference,
                        "reversalInformation": { "amountDetails": amount_details },
                    }),
                )
            }
            ProviderOperation::Refund => {
                let id = require_gateway_reference(payment, operation)?;
                ProviderRequest::post(
                    self.provider(),
                    operation,
                    format!("/pts/v2/payments/{id}/refunds"),
                    json!({
                        "clientReferenceInformation": reference,
                        "orderInformation": { "amountDetails": amount_details },
                    }),
                )
            }
            ProviderOperation::Execute | ProviderOperation::FetchToken => {
                return Err(PaymentError::InvalidParameters(format!(
                    "cybersource does not support {operation}"
                )));
            }
        };
        Ok(request)
    }

    fn is_retryable(&self, response: &ProviderResponse) -> bool {
        if response.status_code >= 500 || response.status_code == 429 {
            return true;
        }
        str_at(&response.data, "/errorInformation/reason")
            .is_some_and(|reason| RETRYABLE_REASONS.contains(&reason))
    }

    fn gateway_reference(&self, data: &Value) -> Option<String> {
        str_at(data, "/id").map(str::to_string)
    }

    fn translate_authorize_status(
        &self,
        _operation: ProviderOperation,
        data: &Value,
    ) -> Result<PaymentStatus> {
        translate_status(
            required_str(data, "/status")?,
            str_at(data, "/riskInformation/profile/decision"),
        )
    }

    fn translate_authorize_status_detail(&self, data: &Value) -> Result<StatusDetail> {
        detail_from(data)
    }

    fn parse_ipn_payload(&self, raw: &[u8]) -> Result<Vec<IpnNotification>> {
        let body = parse_json(raw)?;
        let event = str_at(&body, "/eventType")
            .ok_or_else(|| PaymentError::InvalidParameters("IPN payload without eventType".into()))?
            .to_string();
        if event.starts_with("reports.") || event_status(&event).is_none() {
            return Err(PaymentError::SkipIpn(format!("cybersource event {event}")));
        }
        let entries = body
            .get("payload")
            .and_then(Value::as_array)
            .ok_or_else(|| PaymentError::InvalidParameters("IPN payload without entries".into()))?;

        entries
            .iter()
            .map(|entry| {
                let client_reference = str_at(entry, "/clientReferenceInformation/code")
                    .ok_or_else(|| {
                        PaymentError::InvalidParameters("IPN entry without reference code".into())
                    })?
                    .to_string();
                let mut payload = entry.clone();
                payload["eventType"] = json!(event);
                Ok(IpnNotification {
                    client_reference,
                    payload,
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
        let event = required_str(payload, "/eventType")?;
        event_status(event).ok_or_else(|| PaymentError::NoMatchingStatus(event.to_string()))
    }

    fn translate_ipn_status_detail(&self, payload: &Value) -> Result<StatusDetail> {
        if let Some(reason) = str_at(payload, "/errorInformation/reason") {
            return translate_reason(reason);
        }
        let detail = match required_str(payload, "/eventType")? {
            "payments.decision.review" => StatusDetail::PendingReview,
            "payments.refund.settled" => StatusDetail::Refunded,
            "payments.chargeback.created" => StatusDetail::ChargedBack,
            "payments.decision.reject" => StatusDetail::RejectedByRisk,
            _ => StatusDetail::Ok,
        };
        Ok(detail)
    }
}
