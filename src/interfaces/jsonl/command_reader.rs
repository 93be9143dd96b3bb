use crate::domain::gateway::Provider;
use crate::domain::order::NewOrder;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;

/// Identifies an order the way tenants do.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub tenant_id: String,
    pub reference: String,
}

/// One line of a command file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateOrder(NewOrder),
    ProcessOrder(OrderRef),
    CancelOrder(OrderRef),
    ChargeBackOrder(OrderRef),
    ManualRefundOrder(OrderRef),
    ExecuteOrder(OrderRef),
    CaptureOrder(OrderRef),
    /// A webhook delivery, `body` being the provider's raw JSON.
    Ipn { provider: Provider, body: Value },
}

/// Reads commands from a JSON-lines source.
///
/// Blank lines are skipped. Each remaining line is parsed on its own, so a
/// malformed line yields an error without ending the stream.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.source.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(PaymentError::from)),
            Err(err) => Some(Err(PaymentError::from(err))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::PaymentMethodKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = r#"{"command": "create_order", "tenantId": "acme", "reference": "o-1", "paymentMethod": "ticket", "currency": "BRL", "total": "10.00", "instruments": [{"type": "ticket", "amount": "10.00"}]}

{"command": "process_order", "tenantId": "acme", "reference": "o-1"}
{"command": "ipn", "provider": "bradesco", "body": {"pedidos": []}}"#;
        let commands: Vec<Result<Command>> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(commands.len(), 3);
        match commands[0].as_ref().unwrap() {
            Command::CreateOrder(order) => {
                assert_eq!(order.payment_method, PaymentMethodKind::Ticket);
                assert_eq!(order.total, dec!(10.00));
                assert_eq!(order.instruments[0].installments, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(
            commands[1].as_ref().unwrap(),
            &Command::ProcessOrder(OrderRef {
                tenant_id: "acme".to_string(),
                reference: "o-1".to_string(),
            })
        );
        assert!(matches!(
            commands[2].as_ref().unwrap(),
            Command::Ipn {
                provider: Provider::Bradesco,
                ..
            }
        ));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{\"command\": \"refund_everything\"}\n{\"command\": \"cancel_order\", \"tenantId\": \"acme\", \"reference\": \"o-1\"}";
        let commands: Vec<Result<Command>> = CommandReader::new(data.as_bytes()).commands().collect();

        assert!(commands[0].is_err());
        assert!(commands[1].is_ok());
    }
}
