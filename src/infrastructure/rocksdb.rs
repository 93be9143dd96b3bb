use crate::domain::gateway::Provider;
use crate::domain::ports::{IpnFailure, IpnFailureLog};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Column Family for failed webhook deliveries.
pub const CF_IPN_FAILURES: &str = "ipn_failures";

#[derive(Serialize, Deserialize)]
struct StoredFailure {
    provider: Provider,
    client_reference: String,
    fingerprint: u64,
    error_code: String,
    message: String,
    #[serde(with = "time::serde::rfc3339")]
    at: OffsetDateTime,
}

/// A persistent webhook failure log using RocksDB.
///
/// Keys are `provider:len:client_reference:fingerprint:sequence`, so counting the
/// failures of one delivery is a prefix scan. Counts survive restarts, which
/// keeps retry-storm suppression effective across deployments.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbIpnFailureLog {
    db: Arc<DB>,
    sequence: Arc<AtomicU64>,
}

impl RocksDbIpnFailureLog {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_failures = ColumnFamilyDescriptor::new(CF_IPN_FAILURES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_failures])?;

        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Ok(Self {
            db: Arc::new(db),
            sequence: Arc::new(AtomicU64::new(nanos as u64)),
        })
    }

    /// The reference is length-prefixed since it may itself contain `:`.
    fn prefix(provider: Provider, client_reference: &str, fingerprint: u64) -> String {
        format!(
            "{provider}:{}:{client_reference}:{fingerprint:016x}:",
            client_reference.len()
        )
    }
}

fn missing_cf() -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::other(
        "IPN failures column family not found",
    )))
}

#[async_trait]
impl IpnFailureLog for RocksDbIpnFailureLog {
    async fn record(&self, failure: IpnFailure) -> Result<()> {
        let cf = self.db.cf_handle(CF_IPN_FAILURES).ok_or_else(missing_cf)?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let key = format!(
            "{}{sequence:020}",
            Self::prefix(failure.provider, &failure.client_reference, failure.fingerprint)
        );
        let value = serde_json::to_vec(&StoredFailure {
            provider: failure.provider,
            client_reference: failure.client_reference,
            fingerprint: failure.fingerprint,
            error_code: failure.error_code,
            message: failure.message,
            at: failure.at,
        })?;

        self.db.put_cf(&cf, key.as_bytes(), value)?;
        Ok(())
    }

    async fn count(
        &self,
        provider: Provider,
        client_reference: &str,
        fingerprint: u64,
    ) -> Result<usize> {
        let cf = self.db.cf_handle(CF_IPN_FAILURES).ok_or_else(missing_cf)?;
        let prefix = Self::prefix(provider, client_reference, fingerprint);

        let mut count = 0;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, _value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failure(reference: &str, fingerprint: u64) -> IpnFailure {
        IpnFailure {
            provider: Provider::MercadoPago,
            client_reference: reference.to_string(),
            fingerprint,
            error_code: "payment_not_found".to_string(),
            message: "Payment not found".to_string(),
            at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let log = RocksDbIpnFailureLog::open(dir.path()).expect("Failed to open RocksDB");
        assert!(log.db.cf_handle(CF_IPN_FAILURES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_counts_by_prefix() {
        let dir = tempdir().unwrap();
        let log = RocksDbIpnFailureLog::open(dir.path()).unwrap();

        log.record(failure("o-1_1", 1)).await.unwrap();
        log.record(failure("o-1_1", 1)).await.unwrap();
        log.record(failure("o-1_1", 2)).await.unwrap();
        log.record(failure("o-1_10", 1)).await.unwrap();

        assert_eq!(
            log.count(Provider::MercadoPago, "o-1_1", 1).await.unwrap(),
            2
        );
        assert_eq!(
            log.count(Provider::MercadoPago, "o-1_1", 2).await.unwrap(),
            1
        );
        assert_eq!(log.count(Provider::Paypal, "o-1_1", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rocksdb_reference_with_separator_is_isolated() {
        let dir = tempdir().unwrap();
        let log = RocksDbIpnFailureLog::open(dir.path()).unwrap();

        // Would share the `o-1:...07:` prefix without the length field.
        log.record(failure(&format!("o-1:{:016x}", 7), 1)).await.unwrap();

        assert_eq!(log.count(Provider::MercadoPago, "o-1", 7).await.unwrap(), 0);
        assert_eq!(
            log.count(Provider::MercadoPago, &format!("o-1:{:016x}", 7), 1)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_rocksdb_counts_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let log = RocksDbIpnFailureLog::open(dir.path()).unwrap();
            log.record(failure("o-2_1", 9)).await.unwrap();
        }
        let log = RocksDbIpnFailureLog::open(dir.path()).unwrap();
        log.record(failure("o-2_1", 9)).await.unwrap();
        assert_eq!(
            log.count(Provider::MercadoPago, "o-2_1", 9).await.unwrap(),
            2
        );
    }
}
