use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payorch::application::engine::PaymentEngine;
use payorch::application::services::Services;
use payorch::config::Settings;
use payorch::domain::ports::IpnFailureLogRef;
use payorch::infrastructure::in_memory::{
    InMemoryGatewayMethodStore, InMemoryIpnFailureLog, InMemoryOrderStore, InMemoryPaymentStore,
};
use payorch::infrastructure::notifier::LoggingNotifier;
use payorch::infrastructure::sandbox::SandboxProviderClient;
use payorch::infrastructure::token_cache::TokenCache;
use payorch::interfaces::csv::order_writer::{OrderSummary, OrderWriter};
use payorch::interfaces::jsonl::command_reader::{Command, CommandReader, OrderRef};
use payorch::providers::ProviderClientRef;
use payorch::telemetry;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands, one JSON object per line
    input: PathBuf,

    /// Settings file with engine limits, gateway methods and tenants
    #[arg(long)]
    config: PathBuf,

    /// Path to persistent database (optional). If provided, webhook failure
    /// counts are kept in RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[cfg(feature = "storage-rocksdb")]
fn ipn_failure_log(db_path: Option<&Path>) -> Result<IpnFailureLogRef> {
    use payorch::infrastructure::rocksdb::RocksDbIpnFailureLog;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDbIpnFailureLog::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryIpnFailureLog::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn ipn_failure_log(db_path: Option<&Path>) -> Result<IpnFailureLogRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryIpnFailureLog::new()))
}

async fn run(engine: &PaymentEngine, command: Command) -> payorch::error::Result<()> {
    async fn order_id(engine: &PaymentEngine, order: &OrderRef) -> payorch::error::Result<u64> {
        Ok(engine
            .find_order(&order.tenant_id, &order.reference)
            .await?
            .id)
    }

    match command {
        Command::CreateOrder(request) => {
            engine.create_payment_order(request).await?;
        }
        Command::ProcessOrder(order) => {
            engine
                .process_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::CancelOrder(order) => {
            engine
                .cancel_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::ChargeBackOrder(order) => {
            engine
                .charge_back_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::ManualRefundOrder(order) => {
            engine
                .manual_refund_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::ExecuteOrder(order) => {
            engine
                .execute_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::CaptureOrder(order) => {
            engine
                .capture_payment_order(order_id(engine, &order).await?)
                .await?;
        }
        Command::Ipn { provider, body } => {
            let raw = serde_json::to_vec(&body)?;
            let response = engine.process_ipn(provider, &raw).await;
            info!(%provider, status_code = response.status_code, "notification acknowledged");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let settings = Settings::from_path(&cli.config).into_diagnostic()?;
    let client: ProviderClientRef = Arc::new(SandboxProviderClient::new());
    let services = Arc::new(Services {
        payments: Arc::new(InMemoryPaymentStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        gateway_methods: Arc::new(InMemoryGatewayMethodStore::from_settings(&settings)),
        ipn_failures: ipn_failure_log(cli.db_path.as_deref())?,
        notifier: Arc::new(LoggingNotifier),
        tokens: Arc::new(TokenCache::new(&settings.engine, client.clone())),
        provider_client: client,
        settings: settings.engine.clone(),
    });
    let engine = PaymentEngine::new(services);

    // Process commands
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    for (entry, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => {
                if let Err(e) = run(&engine, command).await {
                    warn!(entry = entry + 1, code = e.code(), error = %e, "command failed");
                }
            }
            Err(e) => {
                warn!(entry = entry + 1, error = %e, "skipping unreadable command");
            }
        }
    }

    // Output final state
    let mut summaries = Vec::new();
    for order in engine.orders().await.into_diagnostic()? {
        let payments = engine.payments(order.id).await.into_diagnostic()?;
        summaries.push(OrderSummary::new(&order, &payments));
    }
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(summaries).into_diagnostic()?;

    Ok(())
}
