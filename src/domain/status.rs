use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use time::OffsetDateTime;

/// Canonical, provider-independent status shared by payments and orders.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PaymentStatus {
    Creating,
    PendingAuthorize,
    Authorized,
    PendingCapture,
    Successful,
    PartialRefund,
    InMediation,
    PendingCancel,
    Cancelled,
    Rejected,
    Error,
    ChargedBack,
    Refunded,
    PendingClientAction,
    PendingExecute,
}

impl PaymentStatus {
    /// Provider-independent end states of an order.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Successful
                | PaymentStatus::Cancelled
                | PaymentStatus::Rejected
                | PaymentStatus::Refunded
                | PaymentStatus::ChargedBack
                | PaymentStatus::Error
        )
    }

    /// The order landed somewhere a rollback may be needed.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            PaymentStatus::Rejected | PaymentStatus::Error | PaymentStatus::Cancelled
        )
    }

    /// Funds may be held by the provider on our behalf.
    pub fn may_hold_funds(self) -> bool {
        matches!(
            self,
            PaymentStatus::Authorized
                | PaymentStatus::PendingAuthorize
                | PaymentStatus::Successful
                | PaymentStatus::PendingCapture
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StatusDetail {
    Ok,
    #[default]
    Unknown,
    Pending,
    PendingReview,
    PendingPayment,
    InsufficientFunds,
    InvalidCard,
    CardDisabled,
    Expired,
    RejectedByRisk,
    CallForAuthorize,
    Duplicated,
    InvalidBuyerData,
    BuyerCancelled,
    MerchantCancelled,
    GatewayUnavailable,
    PartialRefund,
    Refunded,
    ChargedBack,
    InMediation,
    OtherInstrumentRejected,
    InternalError,
}

/// One row of the append-only status history of a payment or order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: PaymentStatus,
    pub status_detail: StatusDetail,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl StatusChange {
    pub fn now(status: PaymentStatus, status_detail: StatusDetail) -> Self {
        Self {
            status,
            status_detail,
            at: OffsetDateTime::now_utc(),
        }
    }
}

/// Whether any entry of `history` reached one of `statuses`.
pub fn history_contains(history: &[StatusChange], statuses: &[PaymentStatus]) -> bool {
    history.iter().any(|change| statuses.contains(&change.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&PaymentStatus::PendingClientAction).unwrap();
        assert_eq!(json, "\"pendingClientAction\"");
        assert_eq!(PaymentStatus::ChargedBack.to_string(), "chargedBack");
        assert_eq!(
            PaymentStatus::from_str("inMediation").unwrap(),
            PaymentStatus::InMediation
        );
    }

    #[test]
    fn test_funds_and_failure_classes_do_not_overlap() {
        use strum::IntoEnumIterator;
        for status in PaymentStatus::iter() {
            assert!(!(status.is_failure() && status.may_hold_funds()), "{status}");
        }
    }

    #[test]
    fn test_history_contains() {
        let history = vec![
            StatusChange::now(PaymentStatus::Creating, StatusDetail::Unknown),
            StatusChange::now(PaymentStatus::Successful, StatusDetail::Ok),
        ];
        assert!(history_contains(&history, &[PaymentStatus::Successful]));
        assert!(!history_contains(&history, &[PaymentStatus::Authorized]));
    }
}
