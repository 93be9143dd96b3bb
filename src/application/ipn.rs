use super::policy::PaymentMethodPolicy;
use super::services::ServicesRef;
use crate::domain::gateway::Provider;
use crate::domain::ports::IpnFailure;
use crate::error::{PaymentError, Result};
use crate::providers::{IpnNotification, IpnResponse, ProviderAdapter, adapter_for};
use futures::future::join_all;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh64::xxh64;

/// Reconciles webhook deliveries with the stored payments.
pub struct IpnHandler {
    services: ServicesRef,
}

impl IpnHandler {
    pub fn new(services: ServicesRef) -> Self {
        Self { services }
    }

    /// Processes one raw delivery and builds the acknowledgement for `provider`.
    ///
    /// Batches are processed concurrently. A delivery that keeps failing the
    /// same way is acknowledged once its failure count reaches the configured
    /// threshold, so the provider stops retrying it.
    pub async fn handle(&self, provider: Provider, raw: &[u8]) -> IpnResponse {
        let adapter = adapter_for(provider);
        let fingerprint = xxh64(raw, 0);

        let notifications = match adapter.parse_ipn_payload(raw) {
            Ok(notifications) => notifications,
            Err(PaymentError::SkipIpn(reason)) => {
                debug!(%provider, reason, "notification skipped");
                return adapter.ipn_success_response();
            }
            Err(err) => {
                return self
                    .fail(adapter.as_ref(), fingerprint, vec![(String::new(), err)])
                    .await;
            }
        };

        let results = join_all(
            notifications
                .iter()
                .map(|notification| self.process_notification(provider, notification)),
        )
        .await;

        let failures: Vec<(String, PaymentError)> = notifications
            .into_iter()
            .zip(results)
            .filter_map(|(notification, result)| match result {
                Ok(()) => None,
                Err(PaymentError::SkipIpn(reason)) => {
                    debug!(%provider, reference = notification.client_reference, reason, "notification skipped");
                    None
                }
                Err(err) => Some((notification.client_reference, err)),
            })
            .collect();

        if failures.is_empty() {
            return adapter.ipn_success_response();
        }
        self.fail(adapter.as_ref(), fingerprint, failures).await
    }

    async fn process_notification(
        &self,
        provider: Provider,
        notification: &IpnNotification,
    ) -> Result<()> {
        let reference = notification.client_reference.as_str();
        let payment = self
            .services
            .payments
            .find_by_client_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(reference.to_string()))?;
        let gateway = self
            .services
            .gateway_method(payment.gateway_method_id)
            .await?;
        if gateway.adapter().provider() != provider {
            return Err(PaymentError::InvalidParameters(format!(
                "payment {reference} belongs to {}, not {provider}",
                gateway.adapter().provider()
            )));
        }

        let history = self.services.payments.status_history(payment.id).await?;
        let (status, detail) = gateway.resolve_ipn(&notification.payload, &payment, &history)?;
        let outcome = gateway
            .save_ipn_result(payment.id, status, detail, &notification.payload)
            .await?;

        if outcome.propagate && outcome.payment.is_valid() {
            let order = self
                .services
                .orders
                .get(payment.order_id)
                .await?
                .ok_or_else(|| PaymentError::OrderNotFound(payment.order_id.to_string()))?;
            let policy = PaymentMethodPolicy::for_order(&order, self.services.clone());
            let updated = policy.update_order_status(order.id).await?;
            policy.cancel_payment_order_if_failed(&updated).await;
        }
        Ok(())
    }

    async fn fail(
        &self,
        adapter: &dyn ProviderAdapter,
        fingerprint: u64,
        failures: Vec<(String, PaymentError)>,
    ) -> IpnResponse {
        let provider = adapter.provider();
        let mut attempts = usize::MAX;

        for (reference, err) in &failures {
            warn!(%provider, reference, fingerprint, error = %err, "notification failed");
            let failure = IpnFailure {
                provider,
                client_reference: reference.clone(),
                fingerprint,
                error_code: err.code().to_string(),
                message: err.to_string(),
                at: OffsetDateTime::now_utc(),
            };
            if let Err(log_err) = self.services.ipn_failures.record(failure).await {
                error!(%provider, reference, error = %log_err, "failed to record notification failure");
            }
            let count = self
                .services
                .ipn_failures
                .count(provider, reference, fingerprint)
                .await
                .unwrap_or_else(|count_err| {
                    error!(%provider, reference, error = %count_err, "failed to count notification failures");
                    0
                });
            attempts = attempts.min(count);
        }

        if attempts >= self.services.settings.ipn_failure_threshold {
            info!(%provider, fingerprint, attempts, "acknowledging notification that keeps failing");
            return adapter.ipn_success_response();
        }
        match failures.first() {
            Some((_, err)) => adapter.ipn_fail_response(err),
            None => adapter.ipn_success_response(),
        }
    }
}
