use super::services::ServicesRef;
use super::transition::Transition;
use crate::domain::gateway::{GatewayMethodConfig, GatewayMethodKind};
use crate::domain::order::PaymentOrder;
use crate::domain::payment::{ClientReference, Instrument, NewPayment, Payment, PaymentId, PaymentType};
use crate::domain::ports::StoreTransaction;
use crate::domain::status::{PaymentStatus, StatusChange, StatusDetail, history_contains};
use crate::error::{PaymentError, Result};
use crate::providers::{
    ProviderAdapter, ProviderOperation, ProviderRequest, ProviderResponse, adapter_for,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Result of the initial provider call of a payment.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub payment: Payment,
    /// The provider failed transiently; the next gateway method may be tried.
    pub should_retry: bool,
}

/// Result of applying a provider notification to a payment.
#[derive(Debug, Clone)]
pub struct IpnOutcome {
    pub payment: Payment,
    /// Whether the order aggregate has to be recomputed.
    pub propagate: bool,
}

/// One configured gateway method bound to its provider adapter.
///
/// Owns every payment-level operation; decides *when* a provider is called
/// and which status the payment is in while the call is in flight.
pub struct GatewayMethod {
    config: GatewayMethodConfig,
    adapter: Box<dyn ProviderAdapter>,
    services: ServicesRef,
}

impl GatewayMethod {
    pub fn new(config: GatewayMethodConfig, services: ServicesRef) -> Self {
        let adapter = adapter_for(config.kind.provider());
        Self {
            config,
            adapter,
            services,
        }
    }

    pub fn config(&self) -> &GatewayMethodConfig {
        &self.config
    }

    pub fn kind(&self) -> GatewayMethodKind {
        self.config.kind
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    async fn call_provider(&self, mut request: ProviderRequest) -> Result<ProviderResponse> {
        let provider = self.adapter.provider();
        let timeout = self.services.settings.provider_timeout();
        let call = async move {
            if let Some(refresh_url) = self.adapter.token_endpoint() {
                let token = self
                    .services
                    .tokens
                    .get_token(provider, &self.config.credentials, refresh_url)
                    .await?;
                request.bearer_token = Some(token);
            }
            self.services.provider_client.send(request).await
        };
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::RequestError {
                provider,
                message: format!("no answer within {}ms", timeout.as_millis()),
            }),
        }
    }

    /// Sends `operation` and fails unless the provider answered with a 2xx.
    async fn call_checked(
        &self,
        operation: ProviderOperation,
        payment: &Payment,
    ) -> Result<ProviderResponse> {
        let request = self.adapter.build_request(operation, payment, None)?;
        let response = self.call_provider(request).await?;
        if !response.is_success() || self.adapter.is_retryable(&response) {
            return Err(PaymentError::FailResponse {
                provider: self.adapter.provider(),
                status_code: response.status_code,
                body: response.data,
            });
        }
        Ok(response)
    }

    pub fn validate_payment(&self, instrument: &Instrument) -> Result<()> {
        if !self.config.enabled {
            return Err(PaymentError::ValidationError(format!(
                "gateway method {} is disabled",
                self.config.id
            )));
        }
        if instrument.r#type != self.kind().payment_type() {
            return Err(PaymentError::ValidationError(format!(
                "{} cannot process {} payments",
                self.kind(),
                instrument.r#type
            )));
        }
        match instrument.r#type {
            PaymentType::CreditCard => {
                if instrument.token.is_none() {
                    return Err(PaymentError::ValidationError(
                        "card payments need a token".to_string(),
                    ));
                }
                if let Some(encryption) = instrument.encryption_type
                    && !self.config.accepts_encryption(encryption)
                {
                    return Err(PaymentError::InvalidEncryptionTypes(encryption));
                }
            }
            PaymentType::Paypal => {
                if instrument.return_url.is_none() {
                    return Err(PaymentError::ValidationError(
                        "wallet payments need a return url".to_string(),
                    ));
                }
            }
            PaymentType::Ticket | PaymentType::Totvs => {}
        }
        Ok(())
    }

    /// Full validation before a payment row is created, including the
    /// installment plan and its interest.
    pub fn validate_payment_creation(&self, instrument: &Instrument) -> Result<()> {
        self.validate_payment(instrument)?;

        let installments = instrument.installments;
        let rate = if self.config.interest_rates.is_empty() {
            (installments == 1).then_some(Decimal::ZERO)
        } else {
            self.config.interest_rate(installments)
        };
        let rate = rate.ok_or(PaymentError::InvalidAmountOfInstallments { installments })?;

        let expected = (instrument.amount.value() * rate).round_dp(2);
        if instrument.interest != expected {
            return Err(PaymentError::InterestMismatch {
                expected,
                received: instrument.interest,
            });
        }
        Ok(())
    }

    pub async fn create_payment(
        &self,
        tx: &mut dyn StoreTransaction,
        order: &PaymentOrder,
        instrument: &Instrument,
        client_reference: ClientReference,
    ) -> Result<Payment> {
        tx.insert_payment(NewPayment {
            order_id: order.id,
            gateway_method_id: self.config.id,
            client_reference,
            amount: instrument.amount,
            interest: instrument.interest,
            currency: order.currency,
            installments: instrument.installments,
            r#type: instrument.r#type,
        })
        .await
    }

    /// Records a slot that was never sent to the provider.
    pub async fn create_rejection(
        &self,
        order: &PaymentOrder,
        instrument: &Instrument,
        client_reference: ClientReference,
        detail: StatusDetail,
    ) -> Result<Payment> {
        let mut tx = self.services.payments.begin().await?;
        let mut payment = self
            .create_payment(tx.as_mut(), order, instrument, client_reference)
            .await?;
        payment.status = PaymentStatus::Rejected;
        payment.status_detail = detail;
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        info!(payment_id = payment.id, order_id = order.id, %detail, "payment recorded as rejected");
        Ok(payment)
    }

    /// Sends the payment to the provider while holding its row lock.
    pub async fn process_payment(
        &self,
        payment_id: PaymentId,
        instrument: &Instrument,
    ) -> Result<ProcessOutcome> {
        let mut tx = self.services.payments.begin().await?;
        let mut payment = tx.lock_payment(payment_id).await?;
        if payment.status != PaymentStatus::Creating {
            return Err(PaymentError::InvalidActionForCurrentPaymentStatus {
                action: "process",
                status: payment.status,
            });
        }

        let sent = async {
            let request =
                self.adapter
                    .build_request(ProviderOperation::Create, &payment, Some(instrument))?;
            self.call_provider(request).await
        }
        .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let detail = match err {
                    PaymentError::RequestError { .. } => StatusDetail::GatewayUnavailable,
                    _ => StatusDetail::InternalError,
                };
                self.mark_error(tx, payment, detail).await?;
                return Err(err);
            }
        };

        if self.adapter.is_retryable(&response) {
            warn!(payment_id, gateway = %self.kind(), status_code = response.status_code, "provider unavailable");
            let payment = self
                .mark_error(tx, payment, StatusDetail::GatewayUnavailable)
                .await?;
            return Ok(ProcessOutcome {
                payment,
                should_retry: true,
            });
        }
        if !response.is_success() {
            self.mark_error(tx, payment, StatusDetail::InternalError)
                .await?;
            return Err(PaymentError::FailResponse {
                provider: self.adapter.provider(),
                status_code: response.status_code,
                body: response.data,
            });
        }

        if let Err(err) = self.apply_answer(&mut payment, ProviderOperation::Create, &response.data)
        {
            self.mark_error(tx, payment, StatusDetail::InternalError)
                .await?;
            return Err(err);
        }
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        info!(payment_id, gateway = %self.kind(), status = %payment.status, detail = %payment.status_detail, "payment processed");
        Ok(ProcessOutcome {
            payment,
            should_retry: false,
        })
    }

    async fn mark_error(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        mut payment: Payment,
        detail: StatusDetail,
    ) -> Result<Payment> {
        warn!(payment_id = payment.id, from = %payment.status, %detail, "marking payment as error");
        payment.status = PaymentStatus::Error;
        payment.status_detail = detail;
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        Ok(payment)
    }

    fn authorize_detail(&self, data: &Value) -> StatusDetail {
        self.adapter
            .translate_authorize_status_detail(data)
            .unwrap_or_else(|err| {
                debug!(gateway = %self.kind(), error = %err, "no status detail in provider answer");
                StatusDetail::Unknown
            })
    }

    /// Applies a synchronous provider answer to a locked payment.
    fn apply_answer(
        &self,
        payment: &mut Payment,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<()> {
        let status = self.adapter.translate_authorize_status(operation, data)?;
        if payment.should_ignore_transition_to(status) {
            debug!(payment_id = payment.id, current = %payment.status, answered = %status, "provider answer does not move the payment");
        } else if payment.can_transition_to(status) {
            payment.status = status;
            payment.status_detail = self.authorize_detail(data);
        } else {
            return Err(PaymentError::InvalidStateChange {
                from: payment.status,
                to: status,
            });
        }

        if let Some(reference) = self.adapter.gateway_reference(data)
            && operation == ProviderOperation::Create
        {
            payment.gateway_reference = Some(reference);
        }
        payment.metadata.extend(self.adapter.payment_metadata(data));
        if let Some(expiration) = self.adapter.expiration_date(data) {
            payment.expiration_date = Some(expiration);
        }
        Ok(())
    }

    /// Refuses a 2xx answer that cannot settle a payment sitting in `via`,
    /// such as a declined void. The caller's transition then restores the
    /// previous status.
    fn check_follow_up(
        &self,
        via: &Payment,
        operation: ProviderOperation,
        response: ProviderResponse,
    ) -> Result<ProviderResponse> {
        let answered = self
            .adapter
            .translate_authorize_status(operation, &response.data)?;
        if via.should_ignore_transition_to(answered) || via.can_transition_to(answered) {
            return Ok(response);
        }
        warn!(payment_id = via.id, %operation, current = %via.status, %answered, "provider refused the operation");
        Err(PaymentError::FailResponse {
            provider: self.adapter.provider(),
            status_code: response.status_code,
            body: response.data,
        })
    }

    async fn apply_follow_up(
        &self,
        payment_id: PaymentId,
        operation: ProviderOperation,
        data: &Value,
    ) -> Result<Payment> {
        let mut tx = self.services.payments.begin().await?;
        let mut payment = tx.lock_payment(payment_id).await?;
        // A webhook may have moved the payment since the answer was checked.
        self.apply_answer(&mut payment, operation, data)
            .map_err(|err| match err {
                PaymentError::InvalidStateChange { from, .. } => {
                    PaymentError::InvalidActionForCurrentPaymentStatus {
                        action: "apply provider answer",
                        status: from,
                    }
                }
                other => other,
            })?;
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Moves the payment to `via`, calls the provider and applies its answer.
    async fn call_through(
        &self,
        payment_id: PaymentId,
        via: PaymentStatus,
        operation: ProviderOperation,
    ) -> Result<Payment> {
        let transition = self
            .services
            .transitions()
            .transition_to(payment_id, via, |payment| async move {
                let response = self.call_checked(operation, &payment).await?;
                self.check_follow_up(&payment, operation, response)
            })
            .await?;
        match transition {
            Transition::Ignored { current } => Ok(current),
            Transition::Applied {
                output: response, ..
            } => {
                self.apply_follow_up(payment_id, operation, &response.data)
                    .await
            }
        }
    }

    async fn internal_transition(
        &self,
        payment_id: PaymentId,
        to: PaymentStatus,
        detail: StatusDetail,
    ) -> Result<Payment> {
        let transition = self
            .services
            .transitions()
            .transition_with_detail(payment_id, to, Some(detail), |_| async { Ok(()) })
            .await?;
        Ok(transition.into_payment())
    }

    async fn load(&self, payment_id: PaymentId) -> Result<Payment> {
        self.services
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }

    pub async fn cancel_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self.load(payment_id).await?;
        if self.kind() == GatewayMethodKind::TotvsOffline {
            return self
                .internal_transition(payment_id, PaymentStatus::Cancelled, StatusDetail::MerchantCancelled)
                .await;
        }

        match payment.status {
            // Never reached the provider.
            PaymentStatus::Creating | PaymentStatus::PendingClientAction => {
                let target = if payment.r#type == PaymentType::Paypal {
                    PaymentStatus::Rejected
                } else {
                    PaymentStatus::Cancelled
                };
                self.internal_transition(payment_id, target, StatusDetail::MerchantCancelled)
                    .await
            }
            status => {
                let history = self.services.payments.status_history(payment_id).await?;
                let captured = status == PaymentStatus::Successful
                    || history_contains(&history, &[PaymentStatus::Successful]);
                let operation = if captured {
                    ProviderOperation::Refund
                } else {
                    ProviderOperation::Void
                };
                self.call_through(payment_id, PaymentStatus::PendingCancel, operation)
                    .await
            }
        }
    }

    pub async fn capture_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        match self.kind() {
            GatewayMethodKind::CybersourceCard | GatewayMethodKind::MercadoPagoCard => {
                self.call_through(
                    payment_id,
                    PaymentStatus::PendingCapture,
                    ProviderOperation::Capture,
                )
                .await
            }
            gateway => Err(PaymentError::NotImplemented {
                operation: "capture",
                gateway,
            }),
        }
    }

    pub async fn charge_back_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        match self.kind() {
            // Boletos cannot be disputed.
            GatewayMethodKind::BradescoTicket => {
                debug!(payment_id, "chargeback ignored for boleto");
                self.load(payment_id).await
            }
            GatewayMethodKind::TotvsOffline => Err(PaymentError::NotImplemented {
                operation: "charge_back",
                gateway: GatewayMethodKind::TotvsOffline,
            }),
            _ => {
                self.internal_transition(payment_id, PaymentStatus::ChargedBack, StatusDetail::ChargedBack)
                    .await
            }
        }
    }

    /// Records a refund settled outside the provider.
    pub async fn manual_refund_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.internal_transition(payment_id, PaymentStatus::Refunded, StatusDetail::Refunded)
            .await
    }

    pub async fn execute_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        match self.kind() {
            GatewayMethodKind::PaypalWallet => {
                self.call_through(
                    payment_id,
                    PaymentStatus::PendingExecute,
                    ProviderOperation::Execute,
                )
                .await
            }
            gateway => Err(PaymentError::NotImplemented {
                operation: "execute",
                gateway,
            }),
        }
    }

    /// Translates a notification. A status the adapter does not know makes
    /// the notification irrelevant; an unknown detail degrades to `unknown`.
    pub fn resolve_ipn(
        &self,
        payload: &Value,
        payment: &Payment,
        history: &[StatusChange],
    ) -> Result<(PaymentStatus, StatusDetail)> {
        let status = match self.adapter.translate_ipn_status(payload, payment, history) {
            Ok(status) => status,
            Err(PaymentError::NoMatchingStatus(raw)) => {
                return Err(PaymentError::SkipIpn(format!("no status for {raw}")));
            }
            Err(err) => return Err(err),
        };
        let detail = match self.adapter.translate_ipn_status_detail(payload) {
            Ok(detail) => detail,
            Err(PaymentError::NoMatchingStatus(raw)) => {
                debug!(payment_id = payment.id, raw, "no status detail in notification");
                StatusDetail::Unknown
            }
            Err(err) => return Err(err),
        };
        Ok((status, detail))
    }

    pub async fn save_ipn_result(
        &self,
        payment_id: PaymentId,
        status: PaymentStatus,
        detail: StatusDetail,
        payload: &Value,
    ) -> Result<IpnOutcome> {
        let mut tx = self.services.payments.begin().await?;
        let mut payment = tx.lock_payment(payment_id).await?;
        let from = payment.status;

        if from == status {
            debug!(payment_id, %status, "notification repeats current status");
            return Ok(IpnOutcome {
                payment,
                propagate: false,
            });
        }
        if payment.should_ignore_transition_to(status) {
            return Err(PaymentError::SkipIpn(format!(
                "payment {payment_id} in {from} ignores {status}"
            )));
        }
        if !payment.can_transition_to(status) {
            error!(payment_id, %from, to = %status, anomaly = true, "provider reported an invalid transition, applying it");
        }

        payment.status = status;
        payment.status_detail = detail;
        if payment.gateway_reference.is_none() {
            payment.gateway_reference = self.adapter.gateway_reference(payload);
        }
        payment.metadata.extend(self.adapter.payment_metadata(payload));
        tx.update_payment(payment.clone())?;
        tx.commit().await?;
        info!(payment_id, %from, to = %status, %detail, "notification applied");
        Ok(IpnOutcome {
            payment,
            propagate: true,
        })
    }
}
