use super::gateway_method::GatewayMethod;
use super::services::ServicesRef;
use crate::domain::gateway::GatewayMethodConfig;
use crate::domain::order::{OrderId, PaymentMethodKind, PaymentOrder};
use crate::domain::payment::{ClientReference, Instrument, Payment};
use crate::domain::status::{PaymentStatus, StatusDetail};
use crate::domain::transitions;
use crate::error::{PaymentError, Result};
use futures::future::join_all;
use strum::Display;
use tracing::{debug, error, info, warn};

/// Least resolved first; a dual-instrument order is only as far along as its
/// slowest payment.
const DUAL_PRIORITY: [PaymentStatus; 15] = [
    PaymentStatus::Creating,
    PaymentStatus::PendingClientAction,
    PaymentStatus::PendingExecute,
    PaymentStatus::Rejected,
    PaymentStatus::Error,
    PaymentStatus::PendingCancel,
    PaymentStatus::Cancelled,
    PaymentStatus::PendingAuthorize,
    PaymentStatus::Authorized,
    PaymentStatus::ChargedBack,
    PaymentStatus::Refunded,
    PaymentStatus::PartialRefund,
    PaymentStatus::InMediation,
    PaymentStatus::PendingCapture,
    PaymentStatus::Successful,
];

/// Operations applied to every valid payment of an order at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OrderOperation {
    Cancel,
    ChargeBack,
    ManualRefund,
    Execute,
    Capture,
}

impl OrderOperation {
    pub fn target(self) -> PaymentStatus {
        match self {
            OrderOperation::Cancel => PaymentStatus::Cancelled,
            OrderOperation::ChargeBack => PaymentStatus::ChargedBack,
            OrderOperation::ManualRefund => PaymentStatus::Refunded,
            OrderOperation::Execute => PaymentStatus::PendingExecute,
            OrderOperation::Capture => PaymentStatus::PendingCapture,
        }
    }
}

/// A payment already past the point where `target` makes sense is left alone;
/// anything else stops the fan-out.
pub fn is_skippable(target: PaymentStatus, err: &PaymentError) -> bool {
    matches!(
        err,
        PaymentError::InvalidStateChange { from, .. }
            if !transitions::is_unsafe_invalid_transition(*from, target)
    )
}

/// Order-level orchestration for one tenant-facing payment method.
pub struct PaymentMethodPolicy {
    kind: PaymentMethodKind,
    services: ServicesRef,
}

impl PaymentMethodPolicy {
    pub fn new(kind: PaymentMethodKind, services: ServicesRef) -> Self {
        Self { kind, services }
    }

    pub fn for_order(order: &PaymentOrder, services: ServicesRef) -> Self {
        Self::new(order.payment_method, services)
    }

    pub fn kind(&self) -> PaymentMethodKind {
        self.kind
    }

    /// Gateway methods to try for `instrument`, in fallback order.
    pub async fn select_gateway_methods(
        &self,
        tenant: &str,
        instrument: &Instrument,
    ) -> Result<Vec<GatewayMethodConfig>> {
        let ordered = self
            .services
            .gateway_methods
            .ordered_for_tenant(tenant, self.kind)
            .await?;
        if ordered.is_empty() {
            return Err(PaymentError::PaymentMethodWithoutConfiguredGatewayMethod {
                tenant: tenant.to_string(),
                payment_method: self.kind,
            });
        }

        let Some(encryption) = instrument.encryption_type else {
            return Ok(ordered);
        };
        let preferred: Vec<_> = ordered
            .into_iter()
            .filter(|method| method.accepts_encryption(encryption))
            .collect();
        if !preferred.is_empty() {
            return Ok(preferred);
        }

        // The token can only be decrypted by its issuer, wherever it is configured.
        let fallback: Vec<_> = self
            .services
            .gateway_methods
            .valid_for_payment_method(self.kind)
            .await?
            .into_iter()
            .filter(|method| method.accepts_encryption(encryption))
            .collect();
        if fallback.is_empty() {
            return Err(PaymentError::InvalidEncryptionTypes(encryption));
        }
        debug!(tenant, %encryption, "using gateway methods outside the tenant list");
        Ok(fallback)
    }

    /// Tries `methods` in order until one does not ask for a retry.
    pub async fn process_payment_with_retries(
        &self,
        methods: &[GatewayMethodConfig],
        instrument: &Instrument,
        order: &PaymentOrder,
        previous: Option<Payment>,
        base: &str,
    ) -> Result<Payment> {
        let mut previous = previous;
        let mut candidates = methods.iter().peekable();

        while let Some(config) = candidates.next() {
            let gateway = GatewayMethod::new(config.clone(), self.services.clone());
            let reference = match &previous {
                Some(payment) => payment.client_reference.bump(),
                None => ClientReference::first(base),
            };

            let attempt = async {
                gateway.validate_payment_creation(instrument)?;
                let payment = self
                    .create_or_retry_payment(&gateway, order, instrument, previous.as_ref(), reference)
                    .await?;
                gateway.process_payment(payment.id, instrument).await
            }
            .await;

            match attempt {
                Ok(outcome) if outcome.should_retry && candidates.peek().is_some() => {
                    info!(
                        order_id = order.id,
                        payment_id = outcome.payment.id,
                        gateway = %gateway.kind(),
                        "gateway unavailable, retrying with next gateway method"
                    );
                    previous = Some(outcome.payment);
                }
                Ok(outcome) => return Ok(outcome.payment),
                Err(err) => {
                    if let Err(rollback) = self.set_last_valid_payment(previous.as_ref()).await {
                        debug!(order_id = order.id, error = %rollback, "no payment to fall back to");
                    }
                    return Err(err);
                }
            }
        }

        Err(PaymentError::PaymentMethodWithoutConfiguredGatewayMethod {
            tenant: order.tenant_id.clone(),
            payment_method: self.kind,
        })
    }

    /// Inserts the next attempt and links `previous` to it in one transaction.
    pub async fn create_or_retry_payment(
        &self,
        gateway: &GatewayMethod,
        order: &PaymentOrder,
        instrument: &Instrument,
        previous: Option<&Payment>,
        reference: ClientReference,
    ) -> Result<Payment> {
        let mut tx = self.services.payments.begin().await?;
        let locked_previous = match previous {
            Some(previous) => Some(tx.lock_payment(previous.id).await?),
            None => None,
        };
        let payment = gateway
            .create_payment(tx.as_mut(), order, instrument, reference)
            .await?;
        if let Some(mut previous) = locked_previous {
            previous.retried_with_payment_id = Some(payment.id);
            tx.update_payment(previous)?;
        }
        tx.commit().await?;
        Ok(payment)
    }

    /// Makes `previous` the valid payment of its slot again.
    pub async fn set_last_valid_payment(&self, previous: Option<&Payment>) -> Result<()> {
        let previous = previous.ok_or(PaymentError::NoPreviousPayment)?;
        let mut tx = self.services.payments.begin().await?;
        let mut previous = tx.lock_payment(previous.id).await?;
        let Some(successor_id) = previous.retried_with_payment_id else {
            return Ok(());
        };
        let mut successor = tx.lock_payment(successor_id).await?;
        successor.retried_with_payment_id = Some(previous.id);
        previous.retried_with_payment_id = None;
        info!(payment_id = previous.id, successor_id, "restored previous payment as valid");
        tx.update_payment(successor)?;
        tx.update_payment(previous)?;
        tx.commit().await
    }

    /// Order status derived from the valid payments.
    pub fn calculate_status(&self, payments: &[Payment]) -> PaymentStatus {
        let valid: Vec<&Payment> = payments.iter().filter(|p| p.is_valid()).collect();
        let cardinality = self.kind.cardinality();
        if cardinality == 1 {
            return valid
                .first()
                .map(|payment| payment.status)
                .unwrap_or(PaymentStatus::Creating);
        }
        if valid.len() < cardinality {
            return PaymentStatus::Creating;
        }
        valid
            .iter()
            .map(|payment| payment.status)
            .min_by_key(|status| {
                DUAL_PRIORITY
                    .iter()
                    .position(|candidate| candidate == status)
                    .unwrap_or(0)
            })
            .unwrap_or(PaymentStatus::Creating)
    }

    /// Runs every slot of `order` through its gateway methods and settles the
    /// order status.
    pub async fn process_payment_order(&self, order: &PaymentOrder) -> Result<PaymentOrder> {
        let outcome = self.process_slots(order).await;
        let refreshed = self.update_order_status(order.id).await;
        let refreshed = match refreshed {
            Ok(current) => Ok(self.cancel_payment_order_if_failed(&current).await),
            Err(err) => Err(err),
        };
        outcome?;
        refreshed
    }

    async fn process_slots(&self, order: &PaymentOrder) -> Result<()> {
        let mut slot_failed = false;
        let mut first_error = None;

        for (slot, instrument) in order.instruments.iter().enumerate() {
            let base = order.slot_reference(slot);
            let methods = self
                .select_gateway_methods(&order.tenant_id, instrument)
                .await?;

            if slot_failed {
                let config = methods.into_iter().next().ok_or_else(|| {
                    PaymentError::PaymentMethodWithoutConfiguredGatewayMethod {
                        tenant: order.tenant_id.clone(),
                        payment_method: self.kind,
                    }
                })?;
                GatewayMethod::new(config, self.services.clone())
                    .create_rejection(
                        order,
                        instrument,
                        ClientReference::first(base),
                        StatusDetail::OtherInstrumentRejected,
                    )
                    .await?;
                continue;
            }

            match self
                .process_payment_with_retries(&methods, instrument, order, None, &base)
                .await
            {
                Ok(payment) => {
                    if matches!(payment.status, PaymentStatus::Rejected | PaymentStatus::Error) {
                        slot_failed = true;
                    }
                }
                Err(err) => {
                    warn!(order_id = order.id, slot, error = %err, "payment slot failed");
                    slot_failed = true;
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Applies `operation` to every valid payment of `order` concurrently.
    pub async fn apply_to_order(
        &self,
        order: &PaymentOrder,
        operation: OrderOperation,
    ) -> Result<PaymentOrder> {
        let valid: Vec<Payment> = self
            .services
            .payments
            .find_by_order(order.id)
            .await?
            .into_iter()
            .filter(Payment::is_valid)
            .collect();

        let results = join_all(
            valid
                .iter()
                .map(|payment| self.apply_to_payment(payment, operation)),
        )
        .await;

        let target = operation.target();
        let mut fatal = None;
        for (payment, result) in valid.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(err) if is_skippable(target, &err) => {
                    debug!(payment_id = payment.id, %operation, error = %err, "payment skipped");
                }
                Err(err) if fatal.is_none() => fatal = Some(err),
                Err(err) => {
                    error!(payment_id = payment.id, %operation, error = %err, "order operation failed");
                }
            }
        }

        let refreshed = self.update_order_status(order.id).await;
        if let Some(err) = fatal {
            if let Err(refresh) = refreshed {
                error!(order_id = order.id, error = %refresh, "failed to refresh order status");
            }
            return Err(err);
        }
        refreshed
    }

    async fn apply_to_payment(&self, payment: &Payment, operation: OrderOperation) -> Result<Payment> {
        let gateway = self
            .services
            .gateway_method(payment.gateway_method_id)
            .await?;
        match operation {
            OrderOperation::Cancel => gateway.cancel_payment(payment.id).await,
            OrderOperation::ChargeBack => gateway.charge_back_payment(payment.id).await,
            OrderOperation::ManualRefund => gateway.manual_refund_payment(payment.id).await,
            OrderOperation::Execute => gateway.execute_payment(payment.id).await,
            OrderOperation::Capture => gateway.capture_payment(payment.id).await,
        }
    }

    /// Releases funds still held by a failed order. Never fails.
    pub async fn cancel_payment_order_if_failed(&self, order: &PaymentOrder) -> PaymentOrder {
        if !order.status.is_failure() {
            return order.clone();
        }
        let holds_funds = match self.services.payments.find_by_order(order.id).await {
            Ok(payments) => payments
                .iter()
                .any(|p| p.is_valid() && p.status.may_hold_funds()),
            Err(err) => {
                error!(order_id = order.id, error = %err, "failed to load payments of failed order");
                return order.clone();
            }
        };
        if !holds_funds {
            return order.clone();
        }

        warn!(order_id = order.id, status = %order.status, "failed order still holds funds, cancelling");
        match self.apply_to_order(order, OrderOperation::Cancel).await {
            Ok(updated) => updated,
            Err(err) => {
                error!(order_id = order.id, error = %err, "failed to cancel payments of failed order");
                order.clone()
            }
        }
    }

    /// Recomputes and persists the order status; the tenant hears about changes only.
    pub async fn update_order_status(&self, order_id: OrderId) -> Result<PaymentOrder> {
        let mut order = self
            .services
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;
        let payments = self.services.payments.find_by_order(order_id).await?;
        let status = self.calculate_status(&payments);

        if self.services.orders.update_status(order_id, status).await? {
            info!(order_id, from = %order.status, to = %status, "order status changed");
            order.status = status;
            if let Err(err) = self.services.notifier.order_status_changed(&order).await {
                warn!(order_id, error = %err, "tenant notification failed");
            }
        }
        Ok(order)
    }
}
