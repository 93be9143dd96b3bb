use crate::domain::order::{PaymentMethodKind, PaymentOrder};
use crate::domain::payment::Payment;
use crate::domain::status::PaymentStatus;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row per order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub tenant: String,
    pub reference: String,
    pub payment_method: PaymentMethodKind,
    pub status: PaymentStatus,
    /// Valid payments, one per slot once processed.
    pub payments: usize,
    /// Every payment row, retries included.
    pub attempts: usize,
}

impl OrderSummary {
    pub fn new(order: &PaymentOrder, payments: &[Payment]) -> Self {
        Self {
            tenant: order.tenant_id.clone(),
            reference: order.reference.clone(),
            payment_method: order.payment_method,
            status: order.status,
            payments: payments.iter().filter(|p| p.is_valid()).count(),
            attempts: payments.len(),
        }
    }
}

pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, summaries: impl IntoIterator<Item = OrderSummary>) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_camel_case_values() {
        let mut buffer = Vec::new();
        {
            let mut writer = OrderWriter::new(&mut buffer);
            writer
                .write_orders(vec![OrderSummary {
                    tenant: "acme".to_string(),
                    reference: "o-1".to_string(),
                    payment_method: PaymentMethodKind::TwoCreditCards,
                    status: PaymentStatus::PendingCapture,
                    payments: 2,
                    attempts: 3,
                }])
                .unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "tenant,reference,payment_method,status,payments,attempts\nacme,o-1,twoCreditCards,pendingCapture,2,3\n"
        );
    }
}
