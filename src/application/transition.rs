use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::PaymentStoreRef;
use crate::domain::status::{PaymentStatus, StatusDetail};
use crate::error::{PaymentError, Result};
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Result of a requested status change.
#[derive(Debug)]
pub enum Transition<T> {
    /// The move was persisted and the follow-up action succeeded.
    Applied {
        from: PaymentStatus,
        payment: Payment,
        output: T,
    },
    /// The move was a known no-op from the locked status.
    Ignored { current: Payment },
}

impl<T> Transition<T> {
    pub fn payment(&self) -> &Payment {
        match self {
            Transition::Applied { payment, .. } => payment,
            Transition::Ignored { current } => current,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            Transition::Applied { payment, .. } => payment,
            Transition::Ignored { current } => current,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Guards every status change of a payment.
///
/// The target status is persisted under the row lock before the action runs,
/// so a concurrent caller sees the intermediate status and is refused or
/// ignored by the tables. The action (usually a provider call) runs after the
/// lock is released; if it fails the status is put back.
#[derive(Clone)]
pub struct TransitionEngine {
    payments: PaymentStoreRef,
}

impl TransitionEngine {
    pub fn new(payments: PaymentStoreRef) -> Self {
        Self { payments }
    }

    pub async fn transition_to<T, F, Fut>(
        &self,
        payment_id: PaymentId,
        to: PaymentStatus,
        action: F,
    ) -> Result<Transition<T>>
    where
        F: FnOnce(Payment) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.transition_with_detail(payment_id, to, None, action)
            .await
    }

    pub async fn transition_with_detail<T, F, Fut>(
        &self,
        payment_id: PaymentId,
        to: PaymentStatus,
        detail: Option<StatusDetail>,
        action: F,
    ) -> Result<Transition<T>>
    where
        F: FnOnce(Payment) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut tx = self.payments.begin().await?;
        let mut payment = tx.lock_payment(payment_id).await?;
        let from = payment.status;
        let from_detail = payment.status_detail;

        if payment.should_ignore_transition_to(to) {
            tx.commit().await?;
            debug!(payment_id, %from, %to, "transition ignored");
            return Ok(Transition::Ignored { current: payment });
        }
        if !payment.can_transition_to(to) {
            return Err(PaymentError::InvalidStateChange { from, to });
        }

        payment.status = to;
        if let Some(detail) = detail {
            payment.status_detail = detail;
        }
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        info!(payment_id, %from, %to, "payment transitioned");

        match action(payment.clone()).await {
            Ok(output) => Ok(Transition::Applied {
                from,
                payment,
                output,
            }),
            Err(err) => {
                warn!(payment_id, %from, %to, error = %err, "transition action failed, restoring status");
                if let Err(compensation) = self.restore(payment_id, to, from, from_detail).await {
                    error!(payment_id, %from, %to, error = %compensation, "failed to restore payment status");
                }
                Err(err)
            }
        }
    }

    /// Puts `from` back unless something else already moved the payment on.
    async fn restore(
        &self,
        payment_id: PaymentId,
        applied: PaymentStatus,
        from: PaymentStatus,
        from_detail: StatusDetail,
    ) -> Result<()> {
        let mut tx = self.payments.begin().await?;
        let mut payment = tx.lock_payment(payment_id).await?;
        if payment.status != applied {
            warn!(payment_id, current = %payment.status, expected = %applied, "payment moved on, not restoring");
            return Ok(());
        }
        payment.status = from;
        payment.status_detail = from_detail;
        tx.update_payment(payment)?;
        tx.commit().await
    }
}
