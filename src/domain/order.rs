use super::payment::{Currency, Instrument, PaymentType};
use super::status::PaymentStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub type OrderId = u64;

/// Tenant-facing payment method; each variant selects a payment-method policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PaymentMethodKind {
    CreditCard,
    TwoCreditCards,
    Ticket,
    Paypal,
    Totvs,
}

impl PaymentMethodKind {
    pub fn payment_type(self) -> PaymentType {
        match self {
            PaymentMethodKind::CreditCard | PaymentMethodKind::TwoCreditCards => {
                PaymentType::CreditCard
            }
            PaymentMethodKind::Ticket => PaymentType::Ticket,
            PaymentMethodKind::Paypal => PaymentType::Paypal,
            PaymentMethodKind::Totvs => PaymentType::Totvs,
        }
    }

    /// Number of instruments (and therefore payment slots) per order.
    pub fn cardinality(self) -> usize {
        match self {
            PaymentMethodKind::TwoCreditCards => 2,
            _ => 1,
        }
    }
}

/// Order creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub tenant_id: String,
    pub reference: String,
    pub payment_method: PaymentMethodKind,
    pub currency: Currency,
    pub total: Decimal,
    pub instruments: Vec<Instrument>,
}

impl NewOrder {
    pub fn into_order(self, id: OrderId) -> PaymentOrder {
        PaymentOrder {
            id,
            tenant_id: self.tenant_id,
            reference: self.reference,
            payment_method: self.payment_method,
            currency: self.currency,
            total: self.total,
            instruments: self.instruments,
            status: PaymentStatus::Creating,
        }
    }
}

/// Aggregates the payments needed to settle one tenant order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: OrderId,
    pub tenant_id: String,
    pub reference: String,
    pub payment_method: PaymentMethodKind,
    pub currency: Currency,
    pub total: Decimal,
    pub instruments: Vec<Instrument>,
    /// Derived from the valid payments; only the aggregation strategy sets it.
    pub status: PaymentStatus,
}

impl PaymentOrder {
    /// Client-reference base of the payment slot at `slot`.
    ///
    /// Built from the order id, which is unique across tenants. Tenant
    /// references are only unique within a tenant and may contain any
    /// separator, so they never reach a provider as a lookup key.
    pub fn slot_reference(&self, slot: usize) -> String {
        if self.payment_method.cardinality() > 1 {
            format!("{}-{}", self.id, slot + 1)
        } else {
            self.id.to_string()
        }
    }
}
