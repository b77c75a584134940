use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use tokio::time::Instant;

use super::{subject_matches, BusError, ConsumerSpec, EventBus, Message, Subscription};
use crate::database::{connect_sqlite, DatabaseSetupError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
// rows read per query while scanning for messages matching a filter
const SCAN_PAGE: i64 = 256;

/// Durable bus backed by a SQLite file.
///
/// Every process that opens the same file sees the same stream. Consumer
/// cursors and in-flight deliveries live in the file too, so a restarted
/// consumer resumes where it left off and unacknowledged messages are handed
/// out again once their ack deadline passes.
#[derive(Clone, Debug)]
pub struct SqliteBus {
    pool: SqlitePool,
}

impl SqliteBus {
    pub async fn open(path: &Path) -> Result<Self, BusError> {
        let pool = connect_sqlite(Some(path)).await.map_err(|e| match e {
            DatabaseSetupError::Unavailable(e) => BusError::Storage(e),
            other => BusError::InvalidLocation(other.to_string()),
        })?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, BusError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[async_trait]
impl EventBus for SqliteBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        sqlx::query(
            r#"
            INSERT INTO bus_messages (subject, payload, published_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(subject)
        .bind(payload.as_ref())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn subscribe(&self, spec: ConsumerSpec) -> Result<Box<dyn Subscription>, BusError> {
        sqlx::query(
            r#"
            INSERT INTO bus_consumers (name, filter_subject, cursor)
            VALUES (?, ?, 0)
            ON CONFLICT(name) DO UPDATE SET filter_subject = excluded.filter_subject
            "#,
        )
        .bind(&spec.durable_name)
        .bind(&spec.filter_subject)
        .execute(&self.pool)
        .await?;

        Ok(Box::new(SqliteSubscription {
            pool: self.pool.clone(),
            spec,
        }))
    }
}

struct SqliteSubscription {
    pool: SqlitePool,
    spec: ConsumerSpec,
}

impl SqliteSubscription {
    async fn collect(&self, batch: usize) -> Result<Vec<Message>, BusError> {
        let now = now_millis();
        let due_at = now + self.spec.ack_wait.as_millis() as i64;
        let consumer = self.spec.durable_name.as_str();
        let batch = batch.max(1);

        let mut tx = self.pool.begin().await?;

        // start with a write so the transaction holds the write lock from here on
        let dropped = sqlx::query(
            r#"
            DELETE FROM bus_deliveries
            WHERE consumer = ? AND due_at <= ? AND delivered >= ?
            "#,
        )
        .bind(consumer)
        .bind(now)
        .bind(self.spec.max_deliver as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if dropped > 0 {
            tracing::debug!(consumer, dropped, "messages reached max deliveries, dropping");
        }

        let due = sqlx::query(
            r#"
            SELECT d.seq, d.delivered, m.subject, m.payload
            FROM bus_deliveries d
            JOIN bus_messages m ON m.seq = d.seq
            WHERE d.consumer = ? AND d.due_at <= ?
            ORDER BY d.seq
            LIMIT ?
            "#,
        )
        .bind(consumer)
        .bind(now)
        .bind(batch as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut out = Vec::with_capacity(batch);
        for row in due {
            let seq: i64 = row.try_get("seq")?;
            let delivered: i64 = row.try_get("delivered")?;
            let payload: Vec<u8> = row.try_get("payload")?;

            sqlx::query(
                r#"
                UPDATE bus_deliveries
                SET delivered = delivered + 1, due_at = ?
                WHERE consumer = ? AND seq = ?
                "#,
            )
            .bind(due_at)
            .bind(consumer)
            .bind(seq)
            .execute(&mut *tx)
            .await?;

            out.push(Message {
                seq: seq as u64,
                subject: row.try_get("subject")?,
                payload: Bytes::from(payload),
                delivered: delivered as u32 + 1,
            });
        }

        let consumer_row = sqlx::query(
            r#"
            SELECT filter_subject, cursor FROM bus_consumers WHERE name = ?
            "#,
        )
        .bind(consumer)
        .fetch_one(&mut *tx)
        .await?;
        let filter: String = consumer_row.try_get("filter_subject")?;
        let start: i64 = consumer_row.try_get("cursor")?;
        let mut cursor = start;

        'scan: while out.len() < batch {
            let page = sqlx::query(
                r#"
                SELECT seq, subject, payload
                FROM bus_messages
                WHERE seq > ?
                ORDER BY seq
                LIMIT ?
                "#,
            )
            .bind(cursor)
            .bind(SCAN_PAGE)
            .fetch_all(&mut *tx)
            .await?;
            if page.is_empty() {
                break;
            }

            for row in page {
                let seq: i64 = row.try_get("seq")?;
                let subject: String = row.try_get("subject")?;
                cursor = seq;
                if !subject_matches(&filter, &subject) {
                    continue;
                }

                sqlx::query(
                    r#"
                    INSERT INTO bus_deliveries (consumer, seq, delivered, due_at)
                    VALUES (?, ?, 1, ?)
                    "#,
                )
                .bind(consumer)
                .bind(seq)
                .bind(due_at)
                .execute(&mut *tx)
                .await?;

                let payload: Vec<u8> = row.try_get("payload")?;
                out.push(Message {
                    seq: seq as u64,
                    subject,
                    payload: Bytes::from(payload),
                    delivered: 1,
                });
                if out.len() >= batch {
                    break 'scan;
                }
            }
        }

        if cursor != start {
            sqlx::query("UPDATE bus_consumers SET cursor = ? WHERE name = ?")
                .bind(cursor)
                .bind(consumer)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(out)
    }
}

#[async_trait]
impl Subscription for SqliteSubscription {
    fn spec(&self) -> &ConsumerSpec {
        &self.spec
    }

    async fn fetch(&self, batch: usize, wait: Duration) -> Result<Vec<Message>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            let messages = self.collect(batch).await?;
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, message: &Message) -> Result<(), BusError> {
        sqlx::query("DELETE FROM bus_deliveries WHERE consumer = ? AND seq = ?")
            .bind(&self.spec.durable_name)
            .bind(message.seq as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nak(&self, message: &Message, delay: Duration) -> Result<(), BusError> {
        sqlx::query("UPDATE bus_deliveries SET due_at = ? WHERE consumer = ? AND seq = ?")
            .bind(now_millis() + delay.as_millis() as i64)
            .bind(&self.spec.durable_name)
            .bind(message.seq as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
