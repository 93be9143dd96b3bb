use crate::domain::gateway::{EncryptionType, GatewayMethodId, GatewayMethodKind, Provider};
use crate::domain::order::PaymentMethodKind;
use crate::domain::status::PaymentStatus;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid state change from {from} to {to}")]
    InvalidStateChange {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("No matching status for provider value {0}")]
    NoMatchingStatus(String),
    #[error("IPN skipped: {0}")]
    SkipIpn(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Invalid amount of installments: {installments}")]
    InvalidAmountOfInstallments { installments: u8 },
    #[error("Interest mismatch: expected {expected}, received {received}")]
    InterestMismatch { expected: Decimal, received: Decimal },
    #[error("Price mismatch: expected {expected}, received {received}")]
    PriceMismatch { expected: Decimal, received: Decimal },
    #[error("Cannot {action} a payment in status {status}")]
    InvalidActionForCurrentPaymentStatus {
        action: &'static str,
        status: PaymentStatus,
    },
    #[error("No gateway method accepts encryption type {0}")]
    InvalidEncryptionTypes(EncryptionType),
    #[error("Tenant {tenant} has no gateway method configured for {payment_method}")]
    PaymentMethodWithoutConfiguredGatewayMethod {
        tenant: String,
        payment_method: PaymentMethodKind,
    },
    #[error("{provider} answered with status {status_code}")]
    FailResponse {
        provider: Provider,
        status_code: u16,
        body: Value,
    },
    #[error("Request to {provider} failed: {message}")]
    RequestError { provider: Provider, message: String },
    #[error("{operation} is not implemented for {gateway}")]
    NotImplemented {
        operation: &'static str,
        gateway: GatewayMethodKind,
    },
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    #[error("Payment order not found: {0}")]
    OrderNotFound(String),
    #[error("Gateway method not found: {0}")]
    GatewayMethodNotFound(GatewayMethodId),
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),
    #[error("There is no previous payment to fall back to")]
    NoPreviousPayment,
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl PaymentError {
    /// Stable machine-readable code exposed to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidStateChange { .. } => "invalid_state_change",
            PaymentError::NoMatchingStatus(_) => "no_matching_status",
            PaymentError::SkipIpn(_) => "skip_ipn",
            PaymentError::ValidationError(_) => "validation_error",
            PaymentError::InvalidParameters(_) => "invalid_parameters",
            PaymentError::InvalidAmountOfInstallments { .. } => "invalid_amount_of_installments",
            PaymentError::InterestMismatch { .. } => "interest_mismatch",
            PaymentError::PriceMismatch { .. } => "price_mismatch",
            PaymentError::InvalidActionForCurrentPaymentStatus { .. } => {
                "invalid_action_for_current_payment_status"
            }
            PaymentError::InvalidEncryptionTypes(_) => "invalid_encryption_types",
            PaymentError::PaymentMethodWithoutConfiguredGatewayMethod { .. } => {
                "payment_method_without_configured_gateway_method"
            }
            PaymentError::FailResponse { .. } => "fail_response",
            PaymentError::RequestError { .. } => "request_error",
            PaymentError::NotImplemented { .. } => "not_implemented",
            PaymentError::PaymentNotFound(_) => "payment_not_found",
            PaymentError::OrderNotFound(_) => "payment_order_not_found",
            PaymentError::GatewayMethodNotFound(_) => "gateway_method_not_found",
            PaymentError::TenantNotFound(_) => "tenant_not_found",
            PaymentError::NoPreviousPayment => "no_previous_payment",
            PaymentError::StorageError(_)
            | PaymentError::InternalError(_)
            | PaymentError::IoError(_)
            | PaymentError::JsonError(_)
            | PaymentError::CsvError(_) => "internal_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PaymentError::InvalidStateChange { .. }
            | PaymentError::InvalidActionForCurrentPaymentStatus { .. } => 409,
            PaymentError::SkipIpn(_) => 200,
            PaymentError::ValidationError(_)
            | PaymentError::InvalidParameters(_)
            | PaymentError::InvalidAmountOfInstallments { .. }
            | PaymentError::InterestMismatch { .. }
            | PaymentError::PriceMismatch { .. }
            | PaymentError::InvalidEncryptionTypes(_) => 400,
            PaymentError::PaymentNotFound(_)
            | PaymentError::OrderNotFound(_)
            | PaymentError::GatewayMethodNotFound(_)
            | PaymentError::TenantNotFound(_) => 404,
            PaymentError::NotImplemented { .. } => 501,
            PaymentError::FailResponse { .. } | PaymentError::RequestError { .. } => 502,
            _ => 500,
        }
    }

    /// Everything needed to reproduce the failure.
    pub fn context(&self) -> Value {
        match self {
            PaymentError::InvalidStateChange { from, to } => json!({ "from": from, "to": to }),
            PaymentError::InvalidAmountOfInstallments { installments } => {
                json!({ "installments": installments })
            }
            PaymentError::InterestMismatch { expected, received }
            | PaymentError::PriceMismatch { expected, received } => {
                json!({ "expected": expected, "received": received })
            }
            PaymentError::InvalidActionForCurrentPaymentStatus { action, status } => {
                json!({ "action": action, "status": status })
            }
            PaymentError::InvalidEncryptionTypes(encryption) => {
                json!({ "encryptionType": encryption })
            }
            PaymentError::PaymentMethodWithoutConfiguredGatewayMethod {
                tenant,
                payment_method,
            } => json!({ "tenant": tenant, "paymentMethod": payment_method }),
            PaymentError::FailResponse {
                provider,
                status_code,
                body,
            } => json!({ "provider": provider, "statusCode": status_code, "body": body }),
            PaymentError::RequestError { provider, message } => {
                json!({ "provider": provider, "message": message })
            }
            PaymentError::NotImplemented { operation, gateway } => {
                json!({ "operation": operation, "gateway": gateway })
            }
            other => json!({ "message": other.to_string() }),
        }
    }

    /// Structured body for API callers.
    pub fn to_response_body(&self) -> Value {
        json!({
            "code": self.code(),
            "status": self.http_status(),
            "message": self.to_string(),
            "context": self.context(),
        })
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_change_is_conflict() {
        let err = PaymentError::InvalidStateChange {
            from: PaymentStatus::Rejected,
            to: PaymentStatus::Authorized,
        };
        assert_eq!(err.http_status(), 409);
        assert_eq!(err.code(), "invalid_state_change");
        assert_eq!(
            err.context(),
            json!({ "from": "rejected", "to": "authorized" })
        );
    }

    #[test]
    fn test_response_body_carries_code_and_context() {
        let err = PaymentError::InvalidAmountOfInstallments { installments: 13 };
        let body = err.to_response_body();
        assert_eq!(body["code"], "invalid_amount_of_installments");
        assert_eq!(body["status"], 400);
        assert_eq!(body["context"]["installments"], 13);
    }
}
