use crate::config::EngineSettings;
use crate::domain::gateway::{Credentials, Provider};
use crate::error::{PaymentError, Result};
use crate::providers::{ProviderClientRef, ProviderOperation, ProviderRequest};
use rand::Rng;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: OffsetDateTime,
}

type Entry = Arc<Mutex<Option<CachedToken>>>;

/// OAuth access tokens shared by every gateway method of a provider account.
///
/// Each `(provider, client_id)` pair has its own mutex, so concurrent callers
/// wait for a single refresh instead of stampeding the token endpoint. Tokens
/// are refreshed ahead of expiry by a fixed margin plus random jitter.
pub struct TokenCache {
    client: ProviderClientRef,
    margin: Duration,
    jitter_secs: u64,
    entries: Mutex<HashMap<(Provider, String), Entry>>,
}

impl TokenCache {
    pub fn new(settings: &EngineSettings, client: ProviderClientRef) -> Self {
        Self {
            client,
            margin: Duration::seconds(
                i64::try_from(settings.token_refresh_margin_secs).unwrap_or(i64::MAX),
            ),
            jitter_secs: settings.token_refresh_jitter_secs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_token(
        &self,
        provider: Provider,
        credentials: &Credentials,
        refresh_url: &str,
    ) -> Result<String> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries
                .entry((provider, credentials.client_id.clone()))
                .or_default()
                .clone()
        };

        let mut cached = entry.lock().await;
        if let Some(token) = cached.as_ref()
            && OffsetDateTime::now_utc() < token.refresh_at
        {
            return Ok(token.access_token.clone());
        }

        let token = self.fetch(provider, credentials, refresh_url).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn fetch(
        &self,
        provider: Provider,
        credentials: &Credentials,
        refresh_url: &str,
    ) -> Result<CachedToken> {
        debug!(%provider, client_id = %credentials.client_id, "refreshing access token");
        let request = ProviderRequest::post(
            provider,
            ProviderOperation::FetchToken,
            refresh_url,
            json!({
                "grant_type": "client_credentials",
                "client_id": credentials.client_id,
                "client_secret": credentials.client_secret,
            }),
        );
        let response = self.client.send(request).await?;
        if !response.is_success() {
            return Err(PaymentError::FailResponse {
                provider,
                status_code: response.status_code,
                body: response.data,
            });
        }

        let access_token = response
            .data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::RequestError {
                provider,
                message: "token response without access_token".to_string(),
            })?
            .to_string();
        let expires_in = response
            .data
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let jitter = rand::thread_rng().gen_range(0..=self.jitter_secs);
        let jitter = Duration::seconds(i64::try_from(jitter).unwrap_or(i64::MAX));
        let refresh_at = OffsetDateTime::now_utc()
            .checked_add(Duration::seconds(expires_in))
            .and_then(|at| at.checked_sub(self.margin))
            .and_then(|at| at.checked_sub(jitter))
            .ok_or_else(|| PaymentError::RequestError {
                provider,
                message: format!("token lifetime out of range: expires_in={expires_in}"),
            })?;
        Ok(CachedToken {
            access_token,
            refresh_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderClient, ProviderResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTokenClient {
        calls: AtomicUsize,
        expires_in: i64,
    }

    #[async_trait]
    impl ProviderClient for CountingTokenClient {
        async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse> {
            assert_eq!(request.operation, ProviderOperation::FetchToken);
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ProviderResponse::new(
                200,
                json!({ "access_token": format!("token-{n}"), "expires_in": self.expires_in }),
            ))
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_token_is_reused_until_refresh() {
        let client = Arc::new(CountingTokenClient {
            calls: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let cache = TokenCache::new(&EngineSettings::default(), client.clone());

        let first = cache
            .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
            .await
            .unwrap();
        let second = cache
            .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
            .await
            .unwrap();
        assert_eq!(first, "token-1");
        assert_eq!(second, "token-1");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        let client = Arc::new(CountingTokenClient {
            calls: AtomicUsize::new(0),
            expires_in: 10,
        });
        let cache = TokenCache::new(&EngineSettings::default(), client.clone());

        cache
            .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
            .await
            .unwrap();
        let second = cache
            .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
            .await
            .unwrap();
        assert_eq!(second, "token-2");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let client = Arc::new(CountingTokenClient {
            calls: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let cache = Arc::new(TokenCache::new(&EngineSettings::default(), client.clone()));

        let tasks = (0..8).map(|_| {
            let cache = cache.clone();
            async move {
                cache
                    .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
                    .await
            }
        });
        let tokens = futures::future::join_all(tasks).await;
        assert!(tokens.iter().all(|t| t.as_deref().ok() == Some("token-1")));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_an_error() {
        let client = Arc::new(CountingTokenClient {
            calls: AtomicUsize::new(0),
            expires_in: i64::MAX,
        });
        let cache = TokenCache::new(&EngineSettings::default(), client);

        let result = cache
            .get_token(Provider::Paypal, &credentials(), "/v1/oauth2/token")
            .await;
        assert!(matches!(
            result,
            Err(PaymentError::RequestError {
                provider: Provider::Paypal,
                ..
            })
        ));
    }

    #[test]
    fn test_huge_margin_does_not_overflow() {
        let settings = EngineSettings {
            token_refresh_margin_secs: u64::MAX,
            ..EngineSettings::default()
        };
        let client = Arc::new(CountingTokenClient {
            calls: AtomicUsize::new(0),
            expires_in: 3600,
        });
        let cache = TokenCache::new(&settings, client);
        assert_eq!(cache.margin, Duration::seconds(i64::MAX));
    }
}
