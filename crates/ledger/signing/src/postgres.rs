//! PostgreSQL key registry.
//!
//! A trigger refuses DELETE outright and only lets UPDATE close an open
//! window; every other column is frozen once written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Row};
use tracing::info;

use crate::error::{SigningError, SigningResult};
use crate::key::AgentKey;
use crate::registry::{check_rotation, KeyRegistry};

#[derive(Clone)]
pub struct PostgresKeyRegistry {
    pool: PgPool,
}

impl PostgresKeyRegistry {
    pub async fn connect(database_url: &str) -> SigningResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| SigningError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> SigningResult<Self> {
        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> SigningResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS ledger_agent_keys (
                key_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                public_key TEXT NOT NULL,
                active_from TIMESTAMPTZ NOT NULL,
                active_until TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS ledger_agent_keys_agent ON ledger_agent_keys (agent_id, active_from)",
            r#"
            CREATE OR REPLACE FUNCTION ledger_agent_keys_guard() RETURNS trigger AS $$
            BEGIN
                IF TG_OP = 'DELETE' THEN
                    RAISE EXCEPTION 'agent keys cannot be deleted';
                END IF;
                IF OLD.active_until IS NOT NULL
                   OR NEW.key_id <> OLD.key_id
                   OR NEW.agent_id <> OLD.agent_id
                   OR NEW.public_key <> OLD.public_key
                   OR NEW.active_from <> OLD.active_from THEN
                    RAISE EXCEPTION 'agent key % is immutable except for closing its window', OLD.key_id;
                END IF;
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
            "#,
            "DROP TRIGGER IF EXISTS ledger_agent_keys_no_delete ON ledger_agent_keys",
            r#"
            CREATE TRIGGER ledger_agent_keys_no_delete
                BEFORE UPDATE OR DELETE ON ledger_agent_keys
                FOR EACH ROW EXECUTE FUNCTION ledger_agent_keys_guard()
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| SigningError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyRegistry for PostgresKeyRegistry {
    async fn keys_for(&self, agent_id: &str) -> SigningResult<Vec<AgentKey>> {
        let rows = sqlx::query(
            "SELECT key_id, agent_id, public_key, active_from, active_until \
             FROM ledger_agent_keys WHERE agent_id = $1 ORDER BY active_from ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SigningError::Backend(e.to_string()))?;
        rows.into_iter().map(row_to_key).collect()
    }

    async fn register(&self, key: AgentKey) -> SigningResult<()> {
        key.verifying_key()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;

        sqlx::query("LOCK TABLE ledger_agent_keys IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;

        let existing = sqlx::query(
            "SELECT key_id, agent_id, public_key, active_from, active_until \
             FROM ledger_agent_keys WHERE agent_id = $1",
        )
        .bind(&key.agent_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SigningError::Backend(e.to_string()))?;
        for row in existing {
            let other = row_to_key(row)?;
            if other.overlaps(&key) {
                return Err(SigningError::InvalidKeyWindow(format!(
                    "key {} overlaps key {}",
                    key.key_id, other.key_id
                )));
            }
        }

        insert_key(&mut *conn, &key).await?;
        tx.commit()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;
        info!(agent_id = %key.agent_id, key_id = %key.key_id, "Agent key registered");
        Ok(())
    }

    async fn rotate(
        &self,
        agent_id: &str,
        new_key: AgentKey,
        at: DateTime<Utc>,
    ) -> SigningResult<AgentKey> {
        new_key.verifying_key()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;

        let current = sqlx::query(
            "SELECT key_id, agent_id, public_key, active_from, active_until \
             FROM ledger_agent_keys WHERE agent_id = $1 AND active_until IS NULL FOR UPDATE",
        )
        .bind(agent_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| SigningError::Backend(e.to_string()))?
        .map(row_to_key)
        .transpose()?
        .ok_or_else(|| SigningError::NoActiveKey {
            agent_id: agent_id.to_owned(),
        })?;
        check_rotation(agent_id, &current, &new_key, at)?;

        sqlx::query("UPDATE ledger_agent_keys SET active_until = $1 WHERE key_id = $2")
            .bind(at)
            .bind(&current.key_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;
        insert_key(&mut *conn, &new_key).await?;

        tx.commit()
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;

        info!(
            agent_id = %agent_id,
            retired_key = %current.key_id,
            new_key = %new_key.key_id,
            "Agent key rotated"
        );
        Ok(AgentKey {
            active_until: Some(at),
            ..current
        })
    }
}

async fn insert_key(conn: &mut sqlx::PgConnection, key: &AgentKey) -> SigningResult<()> {
    sqlx::query(
        "INSERT INTO ledger_agent_keys (key_id, agent_id, public_key, active_from, active_until) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&key.key_id)
    .bind(&key.agent_id)
    .bind(&key.public_key)
    .bind(key.active_from)
    .bind(key.active_until)
    .execute(conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("23505") {
                return SigningError::DuplicateKey(key.key_id.clone());
            }
        }
        SigningError::Backend(e.to_string())
    })?;
    Ok(())
}

fn row_to_key(row: PgRow) -> SigningResult<AgentKey> {
    Ok(AgentKey {
        key_id: row
            .try_get("key_id")
            .map_err(|e| SigningError::Backend(e.to_string()))?,
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| SigningError::Backend(e.to_string()))?,
        public_key: row
            .try_get("public_key")
            .map_err(|e| SigningError::Backend(e.to_string()))?,
        active_from: row
            .try_get("active_from")
            .map_err(|e| SigningError::Backend(e.to_string()))?,
        active_until: row
            .try_get("active_until")
            .map_err(|e| SigningError::Backend(e.to_string()))?,
    })
}
