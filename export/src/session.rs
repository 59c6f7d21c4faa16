use crate::service::{ServiceFactory, StorageService, TokenProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudstore::{
    ClientBuilder, Credentials, Result, Retry, Storage, Token, DEFAULT_STORAGE_ROOT_URL,
};
use slog::{info, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Configuration for the storage clients a [`Session`] builds.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Storage API root URL (default [`DEFAULT_STORAGE_ROOT_URL`])
    pub root_url: String,

    /// Retry configuration for storage requests
    pub retry: Retry,

    /// Per-request timeout (default 30s)
    pub timeout: Duration,

    /// Re-authenticate this long before the token actually expires.  (default 0)
    pub refresh_margin: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_url: DEFAULT_STORAGE_ROOT_URL.to_owned(),
            retry: Retry::default(),
            timeout: Duration::from_secs(30),
            refresh_margin: Duration::ZERO,
        }
    }
}

/// A token-managing [`ServiceFactory`].  Each call to [`ServiceFactory::storage`] checks the
/// current token's expiry and, if it has expired, authenticates again and builds a fresh
/// storage client.  Tokens themselves are never modified.
pub struct Session {
    logger: Logger,
    credentials: Credentials,
    provider: Arc<dyn TokenProvider>,
    config: SessionConfig,
    current: Mutex<Option<Current>>,
}

struct Current {
    token: Token,
    storage: Arc<dyn StorageService>,
}

impl Session {
    pub fn new(
        logger: Logger,
        credentials: Credentials,
        provider: Arc<dyn TokenProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            logger,
            credentials,
            provider,
            config,
            current: Mutex::new(None),
        }
    }

    /// Return a valid token, authenticating if necessary.
    pub async fn token(&self) -> Result<Token> {
        let (token, _) = self.current().await?;
        Ok(token)
    }

    fn needs_refresh(&self, token: &Token, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(self.config.refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::zero());
        token.is_expired_at(now + margin)
    }

    /// Get the current token and storage client, replacing both if the token has expired.
    async fn current(&self) -> Result<(Token, Arc<dyn StorageService>)> {
        let mut slot = self.current.lock().await;

        if let Some(ref c) = *slot {
            if !self.needs_refresh(&c.token, Utc::now()) {
                return Ok((c.token.clone(), c.storage.clone()));
            }
            info!(self.logger, "token expired; re-authenticating"; "expired_at" => %c.token.expires_at());
        }

        // drop the old client first, so a failed authentication leaves no stale token behind
        *slot = None;

        let token = self.provider.authenticate(&self.credentials).await?;
        info!(self.logger, "authenticated"; "expires_at" => %token.expires_at());

        let storage: Arc<dyn StorageService> = Arc::new(Storage::new(
            ClientBuilder::new(self.config.root_url.clone())
                .bearer_token(token.value())
                .retry(self.config.retry.clone())
                .timeout(self.config.timeout),
        )?);

        *slot = Some(Current {
            token: token.clone(),
            storage: storage.clone(),
        });
        Ok((token, storage))
    }
}

#[async_trait]
impl ServiceFactory for Session {
    async fn storage(&self) -> Result<Arc<dyn StorageService>> {
        let (_, storage) = self.current().await?;
        Ok(storage)
    }
}
