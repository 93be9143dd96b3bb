use crate::config::Settings;
use crate::domain::gateway::{GatewayMethodConfig, GatewayMethodId, Provider};
use crate::domain::order::{NewOrder, OrderId, PaymentMethodKind, PaymentOrder};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{
    GatewayMethodStore, IpnFailure, IpnFailureLog, OrderStore, PaymentStore, StoreTransaction,
};
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct PaymentTables {
    rows: HashMap<PaymentId, Payment>,
    history: HashMap<PaymentId, Vec<StatusChange>>,
    /// Unique index on the client reference sent to providers.
    references: HashMap<String, PaymentId>,
}

fn duplicate_reference(reference: &str) -> PaymentError {
    PaymentError::StorageError(format!("client reference {reference} already in use"))
}

type RowLocks = Arc<Mutex<HashMap<PaymentId, Arc<Mutex<()>>>>>;

/// A thread-safe in-memory payment table with row-level locking.
///
/// Each row has its own `tokio::sync::Mutex`; a `StoreTransaction` holds the
/// owned guards of every row it touched until it commits or is dropped, which
/// gives the same serialization as `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
    locks: RowLocks,
    next_id: Arc<AtomicU64>,
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            locks: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn row_lock(locks: &RowLocks, id: PaymentId) -> Arc<Mutex<()>> {
    let mut locks = locks.lock().await;
    locks.entry(id).or_default().clone()
}

pub struct InMemoryTransaction {
    tables: Arc<RwLock<PaymentTables>>,
    locks: RowLocks,
    next_id: Arc<AtomicU64>,
    guards: HashMap<PaymentId, OwnedMutexGuard<()>>,
    staged: HashMap<PaymentId, Payment>,
    /// Status at lock time; `None` for rows inserted by this transaction.
    original_status: HashMap<PaymentId, Option<PaymentStatus>>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Payment> {
        if self.guards.contains_key(&id) {
            if let Some(staged) = self.staged.get(&id) {
                return Ok(staged.clone());
            }
        } else {
            let guard = row_lock(&self.locks, id).await.lock_owned().await;
            self.guards.insert(id, guard);
        }

        let tables = self.tables.read().await;
        match tables.rows.get(&id) {
            Some(payment) => {
                self.original_status
                    .entry(id)
                    .or_insert(Some(payment.status));
                Ok(payment.clone())
            }
            None => {
                drop(tables);
                self.guards.remove(&id);
                Err(PaymentError::PaymentNotFound(id.to_string()))
            }
        }
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let reference = payment.client_reference.to_string();
        let staged = self
            .staged
            .values()
            .any(|p| p.client_reference.to_string() == reference);
        if staged || self.tables.read().await.references.contains_key(&reference) {
            return Err(duplicate_reference(&reference));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let guard = row_lock(&self.locks, id).await.lock_owned().await;
        self.guards.insert(id, guard);

        let payment = payment.into_payment(id);
        self.original_status.insert(id, None);
        self.staged.insert(id, payment.clone());
        Ok(payment)
    }

    fn update_payment(&mut self, payment: Payment) -> Result<()> {
        if !self.guards.contains_key(&payment.id) {
            return Err(PaymentError::StorageError(format!(
                "payment {} is not locked by this transaction",
                payment.id
            )));
        }
        self.staged.insert(payment.id, payment);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut tables = self.tables.write().await;
        // Rows inserted concurrently may have claimed the same reference.
        for (id, payment) in &self.staged {
            let reference = payment.client_reference.to_string();
            if let Some(owner) = tables.references.get(&reference)
                && owner != id
            {
                return Err(duplicate_reference(&reference));
            }
        }
        for (id, payment) in self.staged.drain() {
            let changed = match self.original_status.get(&id) {
                Some(Some(status)) => *status != payment.status,
                _ => true,
            };
            if changed {
                tables
                    .history
                    .entry(id)
                    .or_default()
                    .push(StatusChange::now(payment.status, payment.status_detail));
            }
            tables
                .references
                .insert(payment.client_reference.to_string(), id);
            tables.rows.insert(id, payment);
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            locks: self.locks.clone(),
            next_id: self.next_id.clone(),
            guards: HashMap::new(),
            staged: HashMap::new(),
            original_status: HashMap::new(),
        }))
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.rows.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .rows
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn find_by_client_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .get(reference)
            .and_then(|id| tables.rows.get(id))
            .cloned())
    }

    async fn status_history(&self, id: PaymentId) -> Result<Vec<StatusChange>> {
        let tables = self.tables.read().await;
        Ok(tables.history.get(&id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct OrderTables {
    rows: HashMap<OrderId, PaymentOrder>,
    history: HashMap<OrderId, Vec<StatusChange>>,
    claimed: HashSet<OrderId>,
}

/// A thread-safe in-memory store for payment orders.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
    next_id: Arc<AtomicU64>,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<PaymentOrder> {
        let mut tables = self.tables.write().await;
        let duplicated = tables
            .rows
            .values()
            .any(|o| o.tenant_id == order.tenant_id && o.reference == order.reference);
        if duplicated {
            return Err(PaymentError::InvalidParameters(format!(
                "order reference {} already used by tenant {}",
                order.reference, order.tenant_id
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let order = order.into_order(id);
        tables.history.insert(
            id,
            vec![StatusChange::now(order.status, StatusDetail::Unknown)],
        );
        tables.rows.insert(id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<PaymentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables.rows.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        tenant: &str,
        reference: &str,
    ) -> Result<Option<PaymentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .values()
            .find(|o| o.tenant_id == tenant && o.reference == reference)
            .cloned())
    }

    async fn update_status(&self, id: OrderId, status: PaymentStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let order = tables
            .rows
            .get_mut(&id)
            .ok_or_else(|| PaymentError::OrderNotFound(id.to_string()))?;
        if order.status == status {
            return Ok(false);
        }
        order.status = status;
        tables
            .history
            .entry(id)
            .or_default()
            .push(StatusChange::now(status, StatusDetail::Unknown));
        Ok(true)
    }

    async fn claim_for_processing(&self, id: OrderId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let order = tables
            .rows
            .get(&id)
            .ok_or_else(|| PaymentError::OrderNotFound(id.to_string()))?;
        if order.status != PaymentStatus::Creating {
            return Ok(false);
        }
        Ok(tables.claimed.insert(id))
    }

    async fn status_history(&self, id: OrderId) -> Result<Vec<StatusChange>> {
        let tables = self.tables.read().await;
        Ok(tables.history.get(&id).cloned().unwrap_or_default())
    }

    async fn get_all(&self) -> Result<Vec<PaymentOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<PaymentOrder> = tables.rows.values().cloned().collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }
}

/// Gateway method configuration seeded from `Settings`. Read-only at runtime.
#[derive(Default, Clone)]
pub struct InMemoryGatewayMethodStore {
    methods: HashMap<GatewayMethodId, GatewayMethodConfig>,
    tenants: HashMap<String, HashMap<PaymentMethodKind, Vec<GatewayMethodId>>>,
}

impl InMemoryGatewayMethodStore {
    pub fn from_settings(settings: &Settings) -> Self {
        let methods = settings
            .gateway_methods
            .iter()
            .map(|method| (method.id, method.clone()))
            .collect();
        let tenants = settings
            .tenants
            .iter()
            .map(|tenant| {
                let lists = tenant
                    .payment_methods
                    .iter()
                    .map(|entry| (entry.method, entry.gateway_methods.clone()))
                    .collect();
                (tenant.id.clone(), lists)
            })
            .collect();
        Self { methods, tenants }
    }
}

#[async_trait]
impl GatewayMethodStore for InMemoryGatewayMethodStore {
    async fn get(&self, id: GatewayMethodId) -> Result<Option<GatewayMethodConfig>> {
        Ok(self.methods.get(&id).cloned())
    }

    async fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        Ok(self.tenants.contains_key(tenant))
    }

    async fn ordered_for_tenant(
        &self,
        tenant: &str,
        payment_method: PaymentMethodKind,
    ) -> Result<Vec<GatewayMethodConfig>> {
        let ids = self
            .tenants
            .get(tenant)
            .and_then(|lists| lists.get(&payment_method));
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.methods.get(id))
            .filter(|method| method.enabled)
            .cloned()
            .collect())
    }

    async fn valid_for_payment_method(
        &self,
        payment_method: PaymentMethodKind,
    ) -> Result<Vec<GatewayMethodConfig>> {
        let mut methods: Vec<GatewayMethodConfig> = self
            .methods
            .values()
            .filter(|method| method.enabled && method.kind.serves(payment_method))
            .cloned()
            .collect();
        methods.sort_by_key(|method| method.id);
        Ok(methods)
    }
}

/// Failed webhook deliveries kept in memory for the lifetime of the process.
#[derive(Default, Clone)]
pub struct InMemoryIpnFailureLog {
    failures: Arc<RwLock<Vec<IpnFailure>>>,
}

impl InMemoryIpnFailureLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IpnFailureLog for InMemoryIpnFailureLog {
    async fn record(&self, failure: IpnFailure) -> Result<()> {
        self.failures.write().await.push(failure);
        Ok(())
    }

    async fn count(
        &self,
        provider: Provider,
        client_reference: &str,
        fingerprint: u64,
    ) -> Result<usize> {
        let failures = self.failures.read().await;
        Ok(failures
            .iter()
            .filter(|f| {
                f.provider == provider
                    && f.client_reference == client_reference
                    && f.fingerprint == fingerprint
            })
            .count())
    }
}
