//! Durable consumers of the issuer's event streams.
//!
//! Each consumer owns one durable subscription and applies messages in
//! delivery order through an [`EventHandler`]:
//!
//! - a subject this version doesn't recognize is acked and skipped
//! - a payload that fails to decode, or a write that fails, is naked with an
//!   exponential backoff so the bus redelivers it
//! - a message that fails on its last allowed delivery is copied to
//!   `deadletter.{durable_name}.{subject}` and acked
//!
//! Version and timestamp gating in the stores makes redelivery safe.

mod identity;
mod user;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::event::DEAD_LETTER_PREFIX;
use common::prelude::Subject;
use service::bus::{BusError, ConsumerSpec, DynBus, Message, Subscription};

pub use identity::IdentityHandler;
pub use user::UserHandler;

use crate::permissions::{ApplyOutcome, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FETCH_WAIT: Duration = Duration::from_secs(5);

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What a handler did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Already superseded by what is stored.
    Stale,
    /// Recognized, but nothing this handler acts on.
    Ignored,
}

impl From<ApplyOutcome> for Outcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied => Outcome::Applied,
            ApplyOutcome::Stale => Outcome::Stale,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Stream this handler reads, e.g. `auth.identity.>`.
    fn filter_subject(&self) -> &'static str;

    async fn handle(&self, subject: &Subject, payload: &[u8]) -> Result<Outcome, HandleError>;
}

/// How a single message was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked(Outcome),
    /// Unrecognized subject.
    Skipped,
    Retry(Duration),
    DeadLettered,
}

pub struct EventConsumer<H> {
    bus: DynBus,
    spec: ConsumerSpec,
    handler: H,
    batch_size: usize,
    fetch_wait: Duration,
}

impl<H: EventHandler> EventConsumer<H> {
    pub fn new(bus: DynBus, durable_name: impl Into<String>, handler: H) -> Self {
        let spec = ConsumerSpec::new(durable_name, handler.filter_subject());
        Self {
            bus,
            spec,
            handler,
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_wait: DEFAULT_FETCH_WAIT,
        }
    }

    pub fn with_spec(mut self, f: impl FnOnce(ConsumerSpec) -> ConsumerSpec) -> Self {
        self.spec = f(self.spec);
        self
    }

    pub fn with_fetch_wait(mut self, fetch_wait: Duration) -> Self {
        self.fetch_wait = fetch_wait;
        self
    }

    pub fn spec(&self) -> &ConsumerSpec {
        &self.spec
    }

    /// Consume until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) -> Result<(), BusError> {
        let subscription = self.bus.subscribe(self.spec.clone()).await?;
        tracing::info!(
            consumer = %self.spec.durable_name,
            filter = %self.spec.filter_subject,
            "event consumer started"
        );

        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = subscription.fetch(self.batch_size, self.fetch_wait) => batch,
            };

            let messages = match batch {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(consumer = %self.spec.durable_name, error = %e, "fetch failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(FETCH_RETRY_DELAY) => continue,
                    }
                }
            };

            for message in &messages {
                if let Err(e) = self.process(subscription.as_ref(), message).await {
                    tracing::warn!(
                        consumer = %self.spec.durable_name,
                        seq = message.seq,
                        error = %e,
                        "failed to settle message"
                    );
                }
            }
        }

        tracing::info!(consumer = %self.spec.durable_name, "event consumer stopped");
        Ok(())
    }

    pub fn spawn(self, shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let name = self.spec.durable_name.clone();
            if let Err(e) = self.run(shutdown).await {
                tracing::error!(consumer = %name, error = %e, "event consumer failed");
            }
        })
    }

    /// Apply one message and settle it with the bus.
    pub async fn process(
        &self,
        subscription: &dyn Subscription,
        message: &Message,
    ) -> Result<Disposition, BusError> {
        let Some(subject) = Subject::parse(&message.subject) else {
            tracing::debug!(subject = %message.subject, "skipping unrecognized subject");
            subscription.ack(message).await?;
            return Ok(Disposition::Skipped);
        };

        let error = match self.handler.handle(&subject, &message.payload).await {
            Ok(outcome) => {
                tracing::debug!(%subject, seq = message.seq, ?outcome, "event handled");
                subscription.ack(message).await?;
                return Ok(Disposition::Acked(outcome));
            }
            Err(e) => e,
        };

        if message.delivered >= self.spec.max_deliver {
            self.dead_letter(message, &error).await;
            subscription.ack(message).await?;
            return Ok(Disposition::DeadLettered);
        }

        let delay = backoff(message.delivered);
        tracing::warn!(
            %subject,
            seq = message.seq,
            delivered = message.delivered,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "event handling failed, will retry"
        );
        subscription.nak(message, delay).await?;
        Ok(Disposition::Retry(delay))
    }

    async fn dead_letter(&self, message: &Message, error: &HandleError) {
        let subject = dead_letter_subject(&self.spec.durable_name, &message.subject);
        tracing::error!(
            original = %message.subject,
            dead_letter = %subject,
            delivered = message.delivered,
            error = %error,
            "event exhausted its deliveries"
        );
        if let Err(e) = self.bus.publish(&subject, message.payload.clone()).await {
            tracing::error!(dead_letter = %subject, error = %e, "failed to publish dead letter");
        }
    }
}

pub fn dead_letter_subject(durable_name: &str, subject: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}.{durable_name}.{subject}")
}

/// Delay before redelivering a message that failed on delivery `delivered`.
pub fn backoff(delivered: u32) -> Duration {
    let exponent = delivered.saturating_sub(1).min(16);
    BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(BACKOFF_MAX)
}
