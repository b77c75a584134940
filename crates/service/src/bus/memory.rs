use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{subject_matches, BusError, ConsumerSpec, EventBus, Message, Subscription};

/// In-process bus. Cheap to clone; clones share the same stream.
///
/// The log is never trimmed: acked messages stay in memory for the life of
/// the process. Fine for tests and short-lived single-process setups; long
/// running deployments should use [`SqliteBus`](super::SqliteBus).
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    log: Vec<Stored>,
    consumers: HashMap<String, ConsumerState>,
}

struct Stored {
    subject: String,
    payload: Bytes,
}

struct ConsumerState {
    filter_subject: String,
    // index into the log of the next message this consumer hasn't seen
    cursor: usize,
    pending: BTreeMap<u64, Pending>,
}

struct Pending {
    delivered: u32,
    due: Instant,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages ever published.
    pub fn len(&self) -> usize {
        self.inner.state.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every published message on subjects matching `filter`, in order.
    /// Ignores consumer state.
    pub fn messages(&self, filter: &str) -> Vec<(String, Bytes)> {
        self.inner
            .state
            .lock()
            .log
            .iter()
            .filter(|m| subject_matches(filter, &m.subject))
            .map(|m| (m.subject.clone(), m.payload.clone()))
            .collect()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        {
            let mut state = self.inner.state.lock();
            state.log.push(Stored {
                subject: subject.to_string(),
                payload,
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, spec: ConsumerSpec) -> Result<Box<dyn Subscription>, BusError> {
        {
            let mut state = self.inner.state.lock();
            let consumer = state
                .consumers
                .entry(spec.durable_name.clone())
                .or_insert_with(|| ConsumerState {
                    filter_subject: spec.filter_subject.clone(),
                    cursor: 0,
                    pending: BTreeMap::new(),
                });
            consumer.filter_subject = spec.filter_subject.clone();
        }

        Ok(Box::new(MemorySubscription {
            inner: self.inner.clone(),
            spec,
        }))
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    spec: ConsumerSpec,
}

impl MemorySubscription {
    /// Collect up to `batch` deliverable messages and the earliest time a
    /// pending message becomes due again.
    fn collect(&self, batch: usize, now: Instant) -> (Vec<Message>, Option<Instant>) {
        let mut state = self.inner.state.lock();
        let State { log, consumers } = &mut *state;
        let Some(consumer) = consumers.get_mut(&self.spec.durable_name) else {
            return (Vec::new(), None);
        };

        let mut out = Vec::new();
        let mut exhausted = Vec::new();
        for (seq, pending) in consumer.pending.iter_mut() {
            if out.len() >= batch {
                break;
            }
            if pending.due > now {
                continue;
            }
            if pending.delivered >= self.spec.max_deliver {
                exhausted.push(*seq);
                continue;
            }
            pending.delivered += 1;
            pending.due = now + self.spec.ack_wait;
            let stored = &log[(*seq - 1) as usize];
            out.push(Message {
                seq: *seq,
                subject: stored.subject.clone(),
                payload: stored.payload.clone(),
                delivered: pending.delivered,
            });
        }
        for seq in exhausted {
            tracing::debug!(
                consumer = %self.spec.durable_name,
                seq,
                "message reached max deliveries, dropping"
            );
            consumer.pending.remove(&seq);
        }

        while out.len() < batch && consumer.cursor < log.len() {
            let seq = consumer.cursor as u64 + 1;
            let stored = &log[consumer.cursor];
            consumer.cursor += 1;
            if !subject_matches(&consumer.filter_subject, &stored.subject) {
                continue;
            }
            consumer.pending.insert(
                seq,
                Pending {
                    delivered: 1,
                    due: now + self.spec.ack_wait,
                },
            );
            out.push(Message {
                seq,
                subject: stored.subject.clone(),
                payload: stored.payload.clone(),
                delivered: 1,
            });
        }

        let next_due = consumer.pending.values().map(|p| p.due).min();
        (out, next_due)
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn spec(&self) -> &ConsumerSpec {
        &self.spec
    }

    async fn fetch(&self, batch: usize, wait: Duration) -> Result<Vec<Message>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            // register interest before looking, so a publish in between isn't missed
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let (messages, next_due) = self.collect(batch.max(1), now);
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }

            let wake = match next_due {
                Some(due) if due < deadline => due,
                _ => deadline,
            };
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn ack(&self, message: &Message) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        if let Some(consumer) = state.consumers.get_mut(&self.spec.durable_name) {
            consumer.pending.remove(&message.seq);
        }
        Ok(())
    }

    async fn nak(&self, message: &Message, delay: Duration) -> Result<(), BusError> {
        {
            let mut state = self.inner.state.lock();
            if let Some(pending) = state
                .consumers
                .get_mut(&self.spec.durable_name)
                .and_then(|c| c.pending.get_mut(&message.seq))
            {
                pending.due = Instant::now() + delay;
            }
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}
