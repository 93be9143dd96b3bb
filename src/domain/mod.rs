//! Domain layer: entities, the status vocabulary, the transition tables and
//! the ports the application layer drives.

pub mod gateway;
pub mod order;
pub mod payment;
pub mod ports;
pub mod status;
pub mod transitions;
