use super::gateway::{EncryptionType, GatewayMethodId};
use super::order::OrderId;
use super::status::{PaymentStatus, StatusDetail};
use super::transitions;
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};
use time::OffsetDateTime;

pub type PaymentId = u64;

/// Represents a positive monetary amount charged through a provider.
///
/// Wraps `rust_decimal::Decimal` so that zero or negative charges cannot be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    Brl,
    Usd,
    Ars,
    Mxn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PaymentType {
    CreditCard,
    Ticket,
    Paypal,
    Totvs,
}

/// Client-side reference sent to providers, versioned per attempt: `ref_1`,
/// `ref_2`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientReference {
    base: String,
    attempt: u32,
}

impl ClientReference {
    pub fn first(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            attempt: 1,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The reference of the next attempt for the same slot.
    pub fn bump(&self) -> Self {
        Self {
            base: self.base.clone(),
            attempt: self.attempt + 1,
        }
    }
}

impl fmt::Display for ClientReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.attempt)
    }
}

impl FromStr for ClientReference {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (base, attempt) = value.rsplit_once('_').ok_or_else(|| {
            PaymentError::InvalidParameters(format!("client reference without attempt: {value}"))
        })?;
        let attempt = attempt.parse::<u32>().map_err(|_| {
            PaymentError::InvalidParameters(format!("client reference without attempt: {value}"))
        })?;
        if base.is_empty() {
            return Err(PaymentError::InvalidParameters(format!(
                "client reference without base: {value}"
            )));
        }
        Ok(Self {
            base: base.to_string(),
            attempt,
        })
    }
}

impl TryFrom<String> for ClientReference {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClientReference> for String {
    fn from(reference: ClientReference) -> Self {
        reference.to_string()
    }
}

/// Payment data of one instrument (slot) of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub r#type: PaymentType,
    pub amount: Amount,
    #[serde(default)]
    pub interest: Decimal,
    #[serde(default = "default_installments")]
    pub installments: u8,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub encryption_type: Option<EncryptionType>,
    #[serde(default)]
    pub return_url: Option<String>,
}

fn default_installments() -> u8 {
    1
}

/// A payment about to be inserted; the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub gateway_method_id: GatewayMethodId,
    pub client_reference: ClientReference,
    pub amount: Amount,
    pub interest: Decimal,
    pub currency: Currency,
    pub installments: u8,
    pub r#type: PaymentType,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            order_id: self.order_id,
            gateway_method_id: self.gateway_method_id,
            client_reference: self.client_reference,
            gateway_reference: None,
            amount: self.amount,
            interest: self.interest,
            currency: self.currency,
            installments: self.installments,
            r#type: self.r#type,
            status: PaymentStatus::Creating,
            status_detail: StatusDetail::Unknown,
            expiration_date: None,
            metadata: Map::new(),
            retried_with_payment_id: None,
        }
    }
}

/// One attempt to move money through one gateway method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub gateway_method_id: GatewayMethodId,
    pub client_reference: ClientReference,
    pub gateway_reference: Option<String>,
    pub amount: Amount,
    pub interest: Decimal,
    pub currency: Currency,
    pub installments: u8,
    pub r#type: PaymentType,
    pub status: PaymentStatus,
    pub status_detail: StatusDetail,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiration_date: Option<OffsetDateTime>,
    pub metadata: Map<String, Value>,
    pub retried_with_payment_id: Option<PaymentId>,
}

impl Payment {
    /// A payment without successor is the current attempt for its slot.
    pub fn is_valid(&self) -> bool {
        self.retried_with_payment_id.is_none()
    }

    pub fn can_transition_to(&self, status: PaymentStatus) -> bool {
        transitions::can_transition(self.status, status)
    }

    pub fn should_ignore_transition_to(&self, status: PaymentStatus) -> bool {
        transitions::should_ignore_transition(self.status, status)
    }

    /// Total charged to the buyer: principal plus installment interest.
    pub fn total(&self) -> Decimal {
        self.amount.value() + self.interest
    }
}
