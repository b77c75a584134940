//! Event bus abstraction with durable, named consumers.
//!
//! The contract the permission pipeline depends on:
//! - batch fetch with a bounded wait
//! - per-message ack / nak
//! - redelivery after `ack_wait` when a message is neither acked nor naked
//! - a bounded delivery count (`max_deliver`), after which the bus stops
//!   redelivering
//!
//! Each consumer is identified by its durable name. Subscribing again under the
//! same name resumes the same cursor, so every consuming service tracks its
//! own position independently of the others.
//!
//! Two backends are provided: [`MemoryBus`] for tests and single-process
//! deployments, and [`SqliteBus`] for a durable stream shared through a SQLite
//! file.

mod memory;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use memory::MemoryBus;
pub use sqlite::SqliteBus;

pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DELIVER: u32 = 5;

/// Configuration of a durable consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    /// Durable name; one per consuming service and stream.
    pub durable_name: String,
    /// Subject filter, `*` matches one token and `>` the remainder.
    pub filter_subject: String,
    /// How long a fetched message may stay unacknowledged before redelivery.
    pub ack_wait: Duration,
    /// Maximum number of deliveries for one message.
    pub max_deliver: u32,
}

impl ConsumerSpec {
    pub fn new(durable_name: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            durable_name: durable_name.into(),
            filter_subject: filter_subject.into(),
            ack_wait: DEFAULT_ACK_WAIT,
            max_deliver: DEFAULT_MAX_DELIVER,
        }
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn with_max_deliver(mut self, max_deliver: u32) -> Self {
        self.max_deliver = max_deliver.max(1);
        self
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Stream sequence number, unique per bus.
    pub seq: u64,
    pub subject: String,
    pub payload: Bytes,
    /// Number of times this message has been delivered to this consumer,
    /// starting at 1.
    pub delivered: u32,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;

    /// Create the durable consumer if it doesn't exist, otherwise resume it.
    async fn subscribe(&self, spec: ConsumerSpec) -> Result<Box<dyn Subscription>, BusError>;
}

#[async_trait]
pub trait Subscription: Send + Sync {
    fn spec(&self) -> &ConsumerSpec;

    /// Up to `batch` messages, waiting at most `wait` for the first one.
    /// Returns an empty batch on timeout.
    async fn fetch(&self, batch: usize, wait: Duration) -> Result<Vec<Message>, BusError>;

    async fn ack(&self, message: &Message) -> Result<(), BusError>;

    /// Make the message eligible for redelivery after `delay`.
    async fn nak(&self, message: &Message, delay: Duration) -> Result<(), BusError>;
}

pub type DynBus = Arc<dyn EventBus>;

/// Which bus backend to open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    /// Process-local, nothing survives a restart. Every published message
    /// is kept in memory until the process exits.
    #[default]
    Memory,
    /// Durable stream in a SQLite file
    Sqlite { path: PathBuf },
}

impl BusConfig {
    pub async fn open(&self) -> Result<DynBus, BusError> {
        match self {
            BusConfig::Memory => {
                tracing::warn!("using in-memory event bus, events will not leave this process");
                Ok(Arc::new(MemoryBus::new()))
            }
            BusConfig::Sqlite { path } => {
                tracing::info!(path = %path.display(), "opening sqlite event bus");
                Ok(Arc::new(SqliteBus::open(path).await?))
            }
        }
    }
}

/// NATS-style subject matching.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(f), Some(s)) if f == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("bus migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid bus location: {0}")]
    InvalidLocation(String),
}
