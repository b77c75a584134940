//! Revocation checks for API and service account tokens.
//!
//! A valid signature only proves a token was issued; the issuer decides
//! whether it is still live. Answers are cached for a fixed TTL. When the
//! issuer can't be reached the token is accepted (fail open) and that
//! decision is cached too, so an outage costs one slow request per token per
//! TTL rather than one per request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::prelude::Scopes;
use service::{Clock, TtlCache};

use crate::issuer_client::IssuerClient;

/// What the issuer said about a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Live. `scopes` is the issuer's current view of the grant, if sent.
    Valid { scopes: Option<Scopes> },
    /// Revoked, expired or unknown.
    Rejected,
    /// No answer.
    Unreachable,
}

#[async_trait]
pub trait RevocationSource: Send + Sync {
    async fn check(&self, token_id: &str) -> RevocationStatus;
}

/// Asks the issuer over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRevocationSource {
    client: IssuerClient,
}

impl HttpRevocationSource {
    pub fn new(client: IssuerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RevocationSource for HttpRevocationSource {
    async fn check(&self, token_id: &str) -> RevocationStatus {
        match self.client.check_token(token_id).await {
            Ok(Some(response)) if response.valid => RevocationStatus::Valid {
                scopes: response.scopes,
            },
            Ok(_) => RevocationStatus::Rejected,
            Err(e) => {
                tracing::debug!(token_id, error = %e, "token check request failed");
                RevocationStatus::Unreachable
            }
        }
    }
}

/// The decision for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCheck {
    pub valid: bool,
    /// Fresher scopes than the token's claims, when the issuer sent them.
    pub scopes: Option<Scopes>,
}

pub struct RevocationCache {
    source: Arc<dyn RevocationSource>,
    cache: Arc<TtlCache<String, TokenCheck>>,
}

impl std::fmt::Debug for RevocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationCache")
            .field("cache", &self.cache)
            .finish()
    }
}

impl RevocationCache {
    pub fn new(source: Arc<dyn RevocationSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(TtlCache::new(ttl)),
        }
    }

    pub fn with_clock(source: Arc<dyn RevocationSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: Arc::new(TtlCache::with_clock(ttl, clock)),
        }
    }

    pub async fn check_token(&self, token_id: &str) -> TokenCheck {
        let key = token_id.to_string();
        if let Some(check) = self.cache.get(&key) {
            return check;
        }

        let epoch = self.cache.epoch();
        let check = match self.source.check(token_id).await {
            RevocationStatus::Valid { scopes } => TokenCheck {
                valid: true,
                scopes,
            },
            RevocationStatus::Rejected => {
                tracing::info!(token_id, "token rejected by issuer");
                TokenCheck {
                    valid: false,
                    scopes: None,
                }
            }
            RevocationStatus::Unreachable => {
                tracing::warn!(token_id, "issuer unreachable, accepting token without revocation check");
                TokenCheck {
                    valid: true,
                    scopes: None,
                }
            }
        };

        self.cache.insert_if_current(key, epoch, check.clone());
        check
    }

    pub fn invalidate(&self, token_id: &str) {
        self.cache.invalidate(&token_id.to_string());
    }

    pub fn spawn_sweeper(&self, interval: Duration, shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        self.cache.spawn_sweeper("revocation", interval, shutdown)
    }
}
