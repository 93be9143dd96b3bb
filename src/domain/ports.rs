use super::gateway::{GatewayMethodConfig, GatewayMethodId, Provider};
use super::order::{NewOrder, OrderId, PaymentMethodKind, PaymentOrder};
use super::payment::{NewPayment, Payment, PaymentId};
use super::status::{PaymentStatus, StatusChange};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

/// Unit of work over payment rows.
///
/// Rows read through `lock_payment` stay locked until the transaction is
/// committed or dropped. Dropping without `commit` discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads the current row and holds its lock (`SELECT ... FOR UPDATE`).
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Payment>;
    /// Inserts a new row, locked by this transaction, and returns it with its id.
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;
    /// Stages a write of a row previously locked or inserted by this transaction.
    fn update_payment(&mut self, payment: Payment) -> Result<()>;
    /// Applies staged writes and appends status history for changed rows.
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;
    async fn find_by_client_reference(&self, reference: &str) -> Result<Option<Payment>>;
    /// Status history in insertion order.
    async fn status_history(&self, id: PaymentId) -> Result<Vec<StatusChange>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: NewOrder) -> Result<PaymentOrder>;
    async fn get(&self, id: OrderId) -> Result<Option<PaymentOrder>>;
    async fn find_by_reference(&self, tenant: &str, reference: &str)
    -> Result<Option<PaymentOrder>>;
    /// Persists `status` and appends history; returns whether it changed.
    async fn update_status(&self, id: OrderId, status: PaymentStatus) -> Result<bool>;
    /// Marks a `creating` order as taken by one processing run; returns false
    /// if the order was already claimed or has left `creating`.
    async fn claim_for_processing(&self, id: OrderId) -> Result<bool>;
    async fn status_history(&self, id: OrderId) -> Result<Vec<StatusChange>>;
    async fn get_all(&self) -> Result<Vec<PaymentOrder>>;
}

#[async_trait]
pub trait GatewayMethodStore: Send + Sync {
    async fn get(&self, id: GatewayMethodId) -> Result<Option<GatewayMethodConfig>>;
    async fn tenant_exists(&self, tenant: &str) -> Result<bool>;
    /// The tenant's persisted fallback list for `payment_method`, in order.
    async fn ordered_for_tenant(
        &self,
        tenant: &str,
        payment_method: PaymentMethodKind,
    ) -> Result<Vec<GatewayMethodConfig>>;
    /// Every enabled gateway method able to serve `payment_method`.
    async fn valid_for_payment_method(
        &self,
        payment_method: PaymentMethodKind,
    ) -> Result<Vec<GatewayMethodConfig>>;
}

/// A webhook delivery that could not be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct IpnFailure {
    pub provider: Provider,
    pub client_reference: String,
    /// xxh64 of the raw delivery body.
    pub fingerprint: u64,
    pub error_code: String,
    pub message: String,
    pub at: OffsetDateTime,
}

#[async_trait]
pub trait IpnFailureLog: Send + Sync {
    async fn record(&self, failure: IpnFailure) -> Result<()>;
    async fn count(&self, provider: Provider, client_reference: &str, fingerprint: u64)
    -> Result<usize>;
}

/// Outbound notification to the merchant tenant.
#[async_trait]
pub trait TenantNotifier: Send + Sync {
    async fn order_status_changed(&self, order: &PaymentOrder) -> Result<()>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type GatewayMethodStoreRef = Arc<dyn GatewayMethodStore>;
pub type IpnFailureLogRef = Arc<dyn IpnFailureLog>;
pub type TenantNotifierRef = Arc<dyn TenantNotifier>;
