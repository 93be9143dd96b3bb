//! Runtime settings loaded from a JSON file.

use crate::domain::gateway::{GatewayMethodConfig, GatewayMethodId};
use crate::domain::order::PaymentMethodKind;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Upper bound for a single provider call.
    pub provider_timeout_ms: u64,
    /// Identical failed webhook deliveries tolerated before acknowledging.
    pub ipn_failure_threshold: usize,
    pub token_refresh_margin_secs: u64,
    pub token_refresh_jitter_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 10_000,
            ipn_failure_threshold: 3,
            token_refresh_margin_secs: 60,
            token_refresh_jitter_secs: 30,
        }
    }
}

impl EngineSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

/// Fallback list of gateway methods for one payment method of a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPaymentMethod {
    pub method: PaymentMethodKind,
    pub gateway_methods: Vec<GatewayMethodId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettings {
    pub id: String,
    #[serde(default)]
    pub payment_methods: Vec<TenantPaymentMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub gateway_methods: Vec<GatewayMethodConfig>,
    #[serde(default)]
    pub tenants: Vec<TenantSettings>,
}

impl Settings {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects tenant lists that reference unknown or unfit gateway methods.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for method in &self.gateway_methods {
            if !ids.insert(method.id) {
                return Err(PaymentError::InvalidParameters(format!(
                    "gateway method {} is declared twice",
                    method.id
                )));
            }
        }

        for tenant in &self.tenants {
            for entry in &tenant.payment_methods {
                for id in &entry.gateway_methods {
                    let method = self
                        .gateway_methods
                        .iter()
                        .find(|m| m.id == *id)
                        .ok_or(PaymentError::GatewayMethodNotFound(*id))?;
                    if !method.kind.serves(entry.method) {
                        return Err(PaymentError::InvalidParameters(format!(
                            "tenant {} lists {} for {}",
                            tenant.id, method.kind, entry.method
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let settings = Settings::from_json(r#"{"engine": {"ipnFailureThreshold": 5}}"#).unwrap();
        assert_eq!(settings.engine.ipn_failure_threshold, 5);
        assert_eq!(settings.engine.provider_timeout(), Duration::from_secs(10));
        assert_eq!(settings.engine.token_refresh_margin_secs, 60);
        assert!(settings.tenants.is_empty());
    }

    #[test]
    fn test_unknown_gateway_method_is_rejected() {
        let raw = r#"{
            "gatewayMethods": [{"id": 1, "kind": "cybersourceCard"}],
            "tenants": [{"id": "acme", "paymentMethods": [{"method": "creditCard", "gatewayMethods": [1, 2]}]}]
        }"#;
        assert!(matches!(
            Settings::from_json(raw),
            Err(PaymentError::GatewayMethodNotFound(2))
        ));
    }

    #[test]
    fn test_gateway_method_must_serve_payment_method() {
        let raw = r#"{
            "gatewayMethods": [{"id": 1, "kind": "bradescoTicket"}],
            "tenants": [{"id": "acme", "paymentMethods": [{"method": "creditCard", "gatewayMethods": [1]}]}]
        }"#;
        assert!(matches!(
            Settings::from_json(raw),
            Err(PaymentError::InvalidParameters(_))
        ));
    }
}
