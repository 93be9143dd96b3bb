use super::ipn::IpnHandler;
use super::policy::{OrderOperation, PaymentMethodPolicy};
use super::services::ServicesRef;
use crate::domain::gateway::Provider;
use crate::domain::order::{NewOrder, OrderId, PaymentOrder};
use crate::domain::payment::Payment;
use crate::error::{PaymentError, Result};
use crate::providers::IpnResponse;
use rust_decimal::Decimal;
use tracing::info;

/// The main entry point of the orchestration engine.
///
/// `PaymentEngine` validates tenant requests and hands each order to the
/// policy of its payment method. Orders are independent of each other; all
/// shared state lives in the stores behind `Services`.
pub struct PaymentEngine {
    services: ServicesRef,
}

impl PaymentEngine {
    pub fn new(services: ServicesRef) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &ServicesRef {
        &self.services
    }

    /// Registers a new order in `creating`. No provider is called.
    pub async fn create_payment_order(&self, request: NewOrder) -> Result<PaymentOrder> {
        if !self
            .services
            .gateway_methods
            .tenant_exists(&request.tenant_id)
            .await?
        {
            return Err(PaymentError::TenantNotFound(request.tenant_id));
        }

        let cardinality = request.payment_method.cardinality();
        if request.instruments.len() != cardinality {
            return Err(PaymentError::InvalidParameters(format!(
                "{} takes {cardinality} instrument(s), got {}",
                request.payment_method,
                request.instruments.len()
            )));
        }
        let payment_type = request.payment_method.payment_type();
        if let Some(instrument) = request
            .instruments
            .iter()
            .find(|instrument| instrument.r#type != payment_type)
        {
            return Err(PaymentError::InvalidParameters(format!(
                "{} cannot be paid with {}",
                request.payment_method, instrument.r#type
            )));
        }

        let received: Decimal = request
            .instruments
            .iter()
            .map(|instrument| instrument.amount.value())
            .sum();
        if received != request.total {
            return Err(PaymentError::PriceMismatch {
                expected: request.total,
                received,
            });
        }

        let order = self.services.orders.insert(request).await?;
        info!(order_id = order.id, tenant = %order.tenant_id, reference = %order.reference, "payment order created");
        Ok(order)
    }

    pub async fn process_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        let order = self.load_order(order_id).await?;
        if !self.services.orders.claim_for_processing(order_id).await?
            || !self.services.payments.find_by_order(order_id).await?.is_empty()
        {
            return Err(PaymentError::InvalidActionForCurrentPaymentStatus {
                action: "process",
                status: order.status,
            });
        }
        self.policy(&order).process_payment_order(&order).await
    }

    pub async fn cancel_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.apply(order_id, OrderOperation::Cancel).await
    }

    pub async fn charge_back_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.apply(order_id, OrderOperation::ChargeBack).await
    }

    pub async fn manual_refund_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.apply(order_id, OrderOperation::ManualRefund).await
    }

    pub async fn execute_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.apply(order_id, OrderOperation::Execute).await
    }

    pub async fn capture_payment_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.apply(order_id, OrderOperation::Capture).await
    }

    async fn apply(&self, order_id: OrderId, operation: OrderOperation) -> Result<PaymentOrder> {
        let order = self.load_order(order_id).await?;
        self.policy(&order).apply_to_order(&order, operation).await
    }

    /// Always answers; failures are encoded in the acknowledgement.
    pub async fn process_ipn(&self, provider: Provider, raw: &[u8]) -> IpnResponse {
        IpnHandler::new(self.services.clone())
            .handle(provider, raw)
            .await
    }

    pub async fn find_order(&self, tenant: &str, reference: &str) -> Result<PaymentOrder> {
        self.services
            .orders
            .find_by_reference(tenant, reference)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(format!("{tenant}/{reference}")))
    }

    pub async fn orders(&self) -> Result<Vec<PaymentOrder>> {
        self.services.orders.get_all().await
    }

    pub async fn payments(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        self.services.payments.find_by_order(order_id).await
    }

    async fn load_order(&self, order_id: OrderId) -> Result<PaymentOrder> {
        self.services
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))
    }

    fn policy(&self, order: &PaymentOrder) -> PaymentMethodPolicy {
        PaymentMethodPolicy::for_order(order, self.services.clone())
    }
}
