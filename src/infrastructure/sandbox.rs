use crate::domain::gateway::Provider;
use crate::error::Result;
use crate::providers::{
    ProviderClient, ProviderOperation, ProviderRequest, ProviderResponse, str_at,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Outcome requested by a test token such as `tok_decline` or `tok_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Approve,
    Decline,
    Unavailable,
    Review,
    Pending,
}

fn scenario(body: &Value) -> Scenario {
    let hint = ["/tokenInformation/transientTokenJwt", "/token", "/application_context/return_url"]
        .iter()
        .find_map(|pointer| str_at(body, pointer))
        .unwrap_or_default();
    if hint.contains("decline") {
        Scenario::Decline
    } else if hint.contains("unavailable") {
        Scenario::Unavailable
    } else if hint.contains("review") {
        Scenario::Review
    } else if hint.contains("pending") {
        Scenario::Pending
    } else {
        Scenario::Approve
    }
}

/// Offline stand-in for every provider, answering in each provider's native
/// vocabulary. Used by the CLI so orders can be driven end to end without
/// network access.
#[derive(Default)]
pub struct SandboxProviderClient {
    next_id: AtomicU64,
}

impl SandboxProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cybersource(&self, request: &ProviderRequest, scenario: Scenario) -> ProviderResponse {
        let id = format!("{}", 7_000_000 + self.next_id());
        let data = match (request.operation, scenario) {
            (ProviderOperation::Create, Scenario::Decline) => json!({
                "id": id,
                "status": "DECLINED",
                "errorInformation": { "reason": "INSUFFICIENT_FUND" }
            }),
            (ProviderOperation::Create, Scenario::Review) => json!({
                "id": id,
                "status": "AUTHORIZED",
                "riskInformation": { "profile": { "decision": "REVIEW" } }
            }),
            (ProviderOperation::Create, Scenario::Pending) => {
                json!({ "id": id, "status": "AUTHORIZED_PENDING_REVIEW" })
            }
            (ProviderOperation::Create, _) => json!({ "id": id, "status": "AUTHORIZED" }),
            (ProviderOperation::Capture, _) => json!({ "id": id, "status": "PENDING" }),
            (ProviderOperation::Void, _) => json!({ "id": id, "status": "REVERSED" }),
            (ProviderOperation::Refund, _) => json!({ "id": id, "status": "REFUNDED" }),
            _ => return ProviderResponse::new(404, json!({ "message": "unknown operation" })),
        };
        ProviderResponse::new(201, data)
    }

    fn mercado_pago(&self, request: &ProviderRequest, scenario: Scenario) -> ProviderResponse {
        let id = 90_000 + self.next_id();
        let is_ticket = str_at(&request.body, "/payment_method_id").is_some();
        let data = match (request.operation, scenario) {
            (ProviderOperation::Create, _) if is_ticket => {
                let expiration = OffsetDateTime::now_utc() + Duration::days(3);
                json!({
                    "id": id,
                    "status": "pending",
                    "status_detail": "pending_waiting_payment",
                    "payment_type_id": "ticket",
                    "date_of_expiration": expiration
                        .format(&time::format_description::well_known::Rfc3339)
                        .unwrap_or_default(),
                    "transaction_details": {
                        "external_resource_url": format!("https://sandbox.mercadopago.test/ticket/{id}")
                    }
                })
            }
            (ProviderOperation::Create, Scenario::Decline) => json!({
                "id": id,
                "status": "rejected",
                "status_detail": "cc_rejected_insufficient_amount",
                "payment_type_id": "credit_card"
            }),
            (ProviderOperation::Create, Scenario::Review) => json!({
                "id": id,
                "status": "in_process",
                "status_detail": "pending_review_manual",
                "payment_type_id": "credit_card"
            }),
            (ProviderOperation::Create, Scenario::Pending) => json!({
                "id": id,
                "status": "in_process",
                "status_detail": "pending_contingency",
                "payment_type_id": "credit_card"
            }),
            (ProviderOperation::Create, _) => json!({
                "id": id,
                "status": "authorized",
                "status_detail": "pending_capture",
                "payment_type_id": "credit_card"
            }),
            (ProviderOperation::Capture, _) => {
                json!({ "id": id, "status": "approved", "status_detail": "accredited" })
            }
            (ProviderOperation::Void, _) => {
                json!({ "id": id, "status": "cancelled", "status_detail": "by_collector" })
            }
            (ProviderOperation::Refund, _) => json!({ "id": id, "status": "approved" }),
            _ => return ProviderResponse::new(404, json!({ "message": "not_found" })),
        };
        ProviderResponse::new(201, data)
    }

    fn paypal(&self, request: &ProviderRequest, scenario: Scenario) -> ProviderResponse {
        if request.operation == ProviderOperation::FetchToken {
            return ProviderResponse::new(
                200,
                json!({ "access_token": format!("A21AA-{}", self.next_id()), "expires_in": 32400 }),
            );
        }
        if request.bearer_token.is_none() {
            return ProviderResponse::new(401, json!({ "error": "invalid_token" }));
        }
        let id = format!("5O{:08}", self.next_id());
        let data = match (request.operation, scenario) {
            (ProviderOperation::Create, Scenario::Decline) => json!({
                "id": id,
                "status": "DECLINED",
                "details": [{ "issue": "INSTRUMENT_DECLINED" }]
            }),
            (ProviderOperation::Create, _) => json!({
                "id": id,
                "status": "PAYER_ACTION_REQUIRED",
                "links": [{
                    "rel": "payer-action",
                    "href": format!("https://sandbox.paypal.test/checkoutnow?token={id}")
                }]
            }),
            (ProviderOperation::Execute, _) => json!({
                "id": id,
                "status": "COMPLETED",
                "purchase_units": [{
                    "payments": { "captures": [{ "id": format!("CAP-{id}"), "status": "COMPLETED" }] }
                }]
            }),
            (ProviderOperation::Void, _) => json!({ "id": id, "status": "VOIDED" }),
            (ProviderOperation::Refund, _) => json!({ "id": id, "status": "COMPLETED" }),
            _ => return ProviderResponse::new(404, json!({ "name": "RESOURCE_NOT_FOUND" })),
        };
        ProviderResponse::new(201, data)
    }

    fn bradesco(&self, request: &ProviderRequest) -> ProviderResponse {
        let data = match request.operation {
            ProviderOperation::Create => {
                let number = format!("{:08}", 75_000_000 + self.next_id());
                let due = (OffsetDateTime::now_utc() + Duration::days(3)).date();
                json!({
                    "status": { "codigo": "0", "mensagem": "REGISTRO EFETUADO" },
                    "boleto": {
                        "nosso_numero": number,
                        "linha_digitavel": format!("23790.00009 {number} 00000.000000 1"),
                        "url_acesso": format!("https://sandbox.bradesco.test/boleto/{number}"),
                        "data_vencimento": due.to_string(),
                    }
                })
            }
            ProviderOperation::Void | ProviderOperation::Refund => {
                json!({ "status": { "codigo": "0", "mensagem": "OPERACAO EFETUADA" } })
            }
            _ => return ProviderResponse::new(404, json!({})),
        };
        ProviderResponse::new(200, data)
    }

    fn totvs(&self, request: &ProviderRequest) -> ProviderResponse {
        let data = match request.operation {
            ProviderOperation::Create => {
                json!({ "id": format!("T-{}", self.next_id()), "situacao": "PENDENTE" })
            }
            ProviderOperation::Refund => json!({ "situacao": "ESTORNADO" }),
            _ => return ProviderResponse::new(404, json!({})),
        };
        ProviderResponse::new(200, data)
    }
}

#[async_trait]
impl ProviderClient for SandboxProviderClient {
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let scenario = scenario(&request.body);
        debug!(provider = %request.provider, operation = %request.operation, path = %request.path, ?scenario, "sandbox request");
        if scenario == Scenario::Unavailable && request.operation != ProviderOperation::FetchToken
        {
            return Ok(ProviderResponse::new(
                503,
                json!({ "message": "sandbox provider unavailable" }),
            ));
        }
        let response = match request.provider {
            Provider::Cybersource => self.cybersource(&request, scenario),
            Provider::MercadoPago => self.mercado_pago(&request, scenario),
            Provider::Paypal => self.paypal(&request, scenario),
            Provider::Bradesco => self.bradesco(&request),
            Provider::Totvs => self.totvs(&request),
        };
        Ok(response)
    }
}
