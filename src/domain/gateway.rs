use super::order::PaymentMethodKind;
use super::payment::PaymentType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub type GatewayMethodId = u64;

/// The fixed, compiled-in set of external providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Provider {
    Cybersource,
    MercadoPago,
    Paypal,
    Bradesco,
    Totvs,
}

/// Origin of a client-side encrypted card token. A token can only be
/// decrypted by the processor whose key produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EncryptionType {
    Cybersource,
    MercadoPago,
}

/// Binds one provider to one payment capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum GatewayMethodKind {
    CybersourceCard,
    MercadoPagoCard,
    MercadoPagoTicket,
    PaypalWallet,
    BradescoTicket,
    TotvsOffline,
}

impl GatewayMethodKind {
    pub fn provider(self) -> Provider {
        match self {
            GatewayMethodKind::CybersourceCard => Provider::Cybersource,
            GatewayMethodKind::MercadoPagoCard | GatewayMethodKind::MercadoPagoTicket => {
                Provider::MercadoPago
            }
            GatewayMethodKind::PaypalWallet => Provider::Paypal,
            GatewayMethodKind::BradescoTicket => Provider::Bradesco,
            GatewayMethodKind::TotvsOffline => Provider::Totvs,
        }
    }

    pub fn payment_type(self) -> PaymentType {
        match self {
            GatewayMethodKind::CybersourceCard | GatewayMethodKind::MercadoPagoCard => {
                PaymentType::CreditCard
            }
            GatewayMethodKind::MercadoPagoTicket | GatewayMethodKind::BradescoTicket => {
                PaymentType::Ticket
            }
            GatewayMethodKind::PaypalWallet => PaymentType::Paypal,
            GatewayMethodKind::TotvsOffline => PaymentType::Totvs,
        }
    }

    pub fn serves(self, payment_method: PaymentMethodKind) -> bool {
        self.payment_type() == payment_method.payment_type()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Interest charged for paying in `installments` installments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestRate {
    pub installments: u8,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMethodConfig {
    pub id: GatewayMethodId,
    pub kind: GatewayMethodKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub encryption_type: Option<EncryptionType>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub interest_rates: Vec<InterestRate>,
}

fn enabled_by_default() -> bool {
    true
}

impl GatewayMethodConfig {
    pub fn interest_rate(&self, installments: u8) -> Option<Decimal> {
        self.interest_rates
            .iter()
            .find(|rate| rate.installments == installments)
            .map(|rate| rate.rate)
    }

    /// Whether a token of the declared origin can be processed here.
    pub fn accepts_encryption(&self, encryption: EncryptionType) -> bool {
        self.encryption_type == Some(encryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_binds_provider_and_type() {
        assert_eq!(
            GatewayMethodKind::MercadoPagoTicket.provider(),
            Provider::MercadoPago
        );
        assert_eq!(
            GatewayMethodKind::MercadoPagoTicket.payment_type(),
            PaymentType::Ticket
        );
        assert!(GatewayMethodKind::CybersourceCard.serves(PaymentMethodKind::TwoCreditCards));
        assert!(!GatewayMethodKind::PaypalWallet.serves(PaymentMethodKind::CreditCard));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: GatewayMethodConfig = serde_json::from_str(
            r#"{"id": 4, "kind": "cybersourceCard", "encryptionType": "cybersource",
                "interestRates": [{"installments": 1, "rate": "0"}, {"installments": 3, "rate": "0.05"}]}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.interest_rate(3), Some(dec!(0.05)));
        assert_eq!(config.interest_rate(12), None);
        assert!(config.accepts_encryption(EncryptionType::Cybersource));
        assert!(!config.accepts_encryption(EncryptionType::MercadoPago));
    }
}
