use crate::domain::order::PaymentOrder;
use crate::domain::ports::TenantNotifier;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Reports order status changes through the log instead of calling tenants.
#[derive(Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl TenantNotifier for LoggingNotifier {
    async fn order_status_changed(&self, order: &PaymentOrder) -> Result<()> {
        info!(
            tenant = %order.tenant_id,
            order_id = order.id,
            reference = %order.reference,
            status = %order.status,
            "order status changed"
        );
        Ok(())
    }
}
