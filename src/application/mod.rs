//! Application layer: orchestration of payments and orders.
//!
//! `PaymentEngine` is the entry point. It hands each order to the
//! `PaymentMethodPolicy` of its payment method, which drives one
//! `GatewayMethod` per payment. Every status change goes through the
//! `TransitionEngine`; webhook deliveries are reconciled by `IpnHandler`.

pub mod engine;
pub mod gateway_method;
pub mod ipn;
pub mod policy;
pub mod services;
#[cfg(test)]
pub(crate) mod testing;
pub mod transition;
