//! PostgreSQL event store.
//!
//! Appends run in a transaction holding an exclusive table lock, so the
//! head check and the insert are atomic against concurrent writers. A row
//! trigger rejects every UPDATE and DELETE on `ledger_events`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_types::{Event, EventParts, GENESIS_PREV_HASH};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChainHead, EventReader, EventWriter};

const EVENT_COLUMNS: &str = "sequence_number, event_id, event_type, actor_id, payload, \
     content_hash, prev_hash, signature, signing_key_id, sig_alg_version, created_at";

/// PostgreSQL-backed append-only event store.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS ledger_events (
                sequence_number BIGINT PRIMARY KEY,
                event_id UUID NOT NULL UNIQUE,
                event_type TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                payload JSONB NOT NULL,
                content_hash TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                signature TEXT NOT NULL,
                signing_key_id TEXT NOT NULL,
                sig_alg_version INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE OR REPLACE FUNCTION ledger_events_reject_mutation() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'ledger_events is append-only';
            END;
            $$ LANGUAGE plpgsql
            "#,
            "DROP TRIGGER IF EXISTS ledger_events_immutable ON ledger_events",
            r#"
            CREATE TRIGGER ledger_events_immutable
                BEFORE UPDATE OR DELETE ON ledger_events
                FOR EACH ROW EXECUTE FUNCTION ledger_events_reject_mutation()
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventReader for PostgresEventStore {
    async fn head(&self) -> StoreResult<Option<ChainHead>> {
        let row = sqlx::query(
            "SELECT sequence_number, content_hash FROM ledger_events \
             ORDER BY sequence_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(row_to_head).transpose()
    }

    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM ledger_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .try_get("n")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(count as u64)
    }

    async fn get(&self, sequence_number: u64) -> StoreResult<Option<Event>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM ledger_events WHERE sequence_number = $1"
        ))
        .bind(to_i64(sequence_number)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(row_to_event).transpose()
    }

    async fn get_by_id(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM ledger_events WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(row_to_event).transpose()
    }

    async fn read_range(&self, from_seq: u64, to_seq: u64) -> StoreResult<Vec<Event>> {
        if from_seq == 0 || to_seq == 0 || from_seq > to_seq {
            return Err(StoreError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM ledger_events \
             WHERE sequence_number BETWEEN $1 AND $2 ORDER BY sequence_number ASC"
        ))
        .bind(to_i64(from_seq)?)
        .bind(to_i64(to_seq)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(row_to_event).collect()
    }

    async fn read_all(&self) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM ledger_events ORDER BY sequence_number ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(row_to_event).collect()
    }
}

#[async_trait]
impl EventWriter for PostgresEventStore {
    async fn append(
        &self,
        event: Event,
        expected_head: Option<&ChainHead>,
    ) -> StoreResult<ChainHead> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query("LOCK TABLE ledger_events IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let actual_head = sqlx::query(
            "SELECT sequence_number, content_hash FROM ledger_events \
             ORDER BY sequence_number DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .map(row_to_head)
        .transpose()?;

        if actual_head.as_ref() != expected_head {
            return Err(StoreError::HeadMismatch {
                expected: expected_head.map(|h| h.sequence_number),
                actual: actual_head.map(|h| h.sequence_number),
            });
        }

        let expected_seq = ChainHead::next_sequence(expected_head);
        if event.sequence_number() != expected_seq {
            return Err(StoreError::SequenceMismatch {
                expected: expected_seq,
                actual: event.sequence_number(),
            });
        }
        let expected_prev = expected_head
            .map(|h| h.content_hash.as_str())
            .unwrap_or(GENESIS_PREV_HASH);
        if event.prev_hash() != expected_prev {
            return Err(StoreError::PrevHashMismatch {
                expected: expected_prev.to_owned(),
                actual: event.prev_hash().to_owned(),
            });
        }

        sqlx::query(&format!(
            "INSERT INTO ledger_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(to_i64(event.sequence_number())?)
        .bind(event.event_id())
        .bind(event.event_type())
        .bind(event.actor_id())
        .bind(event.payload())
        .bind(event.content_hash())
        .bind(event.prev_hash())
        .bind(event.signature())
        .bind(event.signing_key_id())
        .bind(i32::from(event.sig_alg_version()))
        .bind(event.created_at())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_conflict(e, event.event_id()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(sequence = event.sequence_number(), "Event appended to postgres store");
        Ok(ChainHead::of(&event))
    }
}

fn row_to_head(row: PgRow) -> StoreResult<ChainHead> {
    Ok(ChainHead {
        sequence_number: row
            .try_get::<i64, _>("sequence_number")
            .map_err(|e| StoreError::Backend(e.to_string()))? as u64,
        content_hash: row
            .try_get("content_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn row_to_event(row: PgRow) -> StoreResult<Event> {
    let sig_alg_version: i32 = row
        .try_get("sig_alg_version")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(Event::from_parts(EventParts {
        sequence_number: row
            .try_get::<i64, _>("sequence_number")
            .map_err(|e| StoreError::Backend(e.to_string()))? as u64,
        event_id: row
            .try_get("event_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        event_type: row
            .try_get("event_type")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        actor_id: row
            .try_get("actor_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        payload: row
            .try_get("payload")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        content_hash: row
            .try_get("content_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        prev_hash: row
            .try_get("prev_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        signature: row
            .try_get("signature")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        signing_key_id: row
            .try_get("signing_key_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        sig_alg_version: u16::try_from(sig_alg_version)
            .map_err(|_| StoreError::Serialization(format!(
                "sig_alg_version out of range: {sig_alg_version}"
            )))?,
        created_at,
    }))
}

fn map_sqlx_conflict(err: sqlx::Error, event_id: Uuid) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateEvent(event_id.to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn to_i64(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Backend("sequence number too large".into()))
}
