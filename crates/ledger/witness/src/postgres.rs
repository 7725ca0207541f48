//! PostgreSQL investigation and attestation stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::attestation::{AttestationStore, WitnessAttestation};
use crate::error::{WitnessError, WitnessResult};
use crate::investigation::{Investigation, PairStatus};
use crate::store::InvestigationStore;

#[derive(Clone)]
pub struct PostgresInvestigationStore {
    pool: PgPool,
}

impl PostgresInvestigationStore {
    pub async fn from_pool(pool: PgPool) -> WitnessResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> WitnessResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS ledger_witness_investigations (
                investigation_id UUID PRIMARY KEY,
                pair_key TEXT NOT NULL,
                status TEXT NOT NULL,
                body JSONB NOT NULL,
                opened_at TIMESTAMPTZ NOT NULL,
                resolved_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS ledger_witness_investigations_pair ON ledger_witness_investigations (pair_key)",
            r#"
            CREATE TABLE IF NOT EXISTS ledger_witness_pair_status (
                pair_key TEXT PRIMARY KEY,
                status JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        ];
        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| WitnessError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn to_body(investigation: &Investigation) -> WitnessResult<serde_json::Value> {
    serde_json::to_value(investigation).map_err(|e| WitnessError::Serialization(e.to_string()))
}

fn row_to_investigation(row: PgRow) -> WitnessResult<Investigation> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| WitnessError::Backend(e.to_string()))?;
    serde_json::from_value(body).map_err(|e| WitnessError::Serialization(e.to_string()))
}

#[async_trait]
impl InvestigationStore for PostgresInvestigationStore {
    async fn insert(&self, investigation: &Investigation) -> WitnessResult<()> {
        sqlx::query(
            "INSERT INTO ledger_witness_investigations \
             (investigation_id, pair_key, status, body, opened_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(investigation.investigation_id)
        .bind(investigation.pair_key())
        .bind(investigation.status.label())
        .bind(to_body(investigation)?)
        .bind(investigation.opened_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WitnessError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn record_resolution(&self, investigation: &Investigation) -> WitnessResult<()> {
        let updated = sqlx::query(
            "UPDATE ledger_witness_investigations \
             SET status = $2, body = $3, resolved_at = now() \
             WHERE investigation_id = $1 AND status = 'active'",
        )
        .bind(investigation.investigation_id)
        .bind(investigation.status.label())
        .bind(to_body(investigation)?)
        .execute(&self.pool)
        .await
        .map_err(|e| WitnessError::Backend(e.to_string()))?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }
        match self.get(investigation.investigation_id).await? {
            Some(stored) => Err(WitnessError::AlreadyResolved {
                id: stored.investigation_id,
                status: stored.status.label().to_owned(),
            }),
            None => Err(WitnessError::InvestigationNotFound(
                investigation.investigation_id,
            )),
        }
    }

    async fn get(&self, investigation_id: Uuid) -> WitnessResult<Option<Investigation>> {
        sqlx::query("SELECT body FROM ledger_witness_investigations WHERE investigation_id = $1")
            .bind(investigation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WitnessError::Backend(e.to_string()))?
            .map(row_to_investigation)
            .transpose()
    }

    async fn list(&self) -> WitnessResult<Vec<Investigation>> {
        sqlx::query("SELECT body FROM ledger_witness_investigations ORDER BY opened_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WitnessError::Backend(e.to_string()))?
            .into_iter()
            .map(row_to_investigation)
            .collect()
    }

    async fn set_pair_status(
        &self,
        pair_key: &str,
        status: Option<PairStatus>,
    ) -> WitnessResult<()> {
        match status {
            Some(status) => {
                let body = serde_json::to_value(&status)
                    .map_err(|e| WitnessError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO ledger_witness_pair_status (pair_key, status, updated_at) \
                     VALUES ($1, $2, now()) \
                     ON CONFLICT (pair_key) DO UPDATE SET status = EXCLUDED.status, updated_at = now()",
                )
                .bind(pair_key)
                .bind(body)
                .execute(&self.pool)
                .await
                .map_err(|e| WitnessError::Backend(e.to_string()))?;
            }
            None => {
                sqlx::query("DELETE FROM ledger_witness_pair_status WHERE pair_key = $1")
                    .bind(pair_key)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| WitnessError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn pair_statuses(&self) -> WitnessResult<HashMap<String, PairStatus>> {
        let rows = sqlx::query("SELECT pair_key, status FROM ledger_witness_pair_status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WitnessError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let key: String = row
                    .try_get("pair_key")
                    .map_err(|e| WitnessError::Backend(e.to_string()))?;
                let status: serde_json::Value = row
                    .try_get("status")
                    .map_err(|e| WitnessError::Backend(e.to_string()))?;
                let status = serde_json::from_value(status)
                    .map_err(|e| WitnessError::Serialization(e.to_string()))?;
                Ok((key, status))
            })
            .collect()
    }
}

/// Attestations keyed by event sequence. Rows are insert-only.
#[derive(Clone)]
pub struct PostgresAttestationStore {
    pool: PgPool,
}

impl PostgresAttestationStore {
    pub async fn from_pool(pool: PgPool) -> WitnessResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> WitnessResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS ledger_witness_attestations (
                sequence_number BIGINT PRIMARY KEY,
                witnesses JSONB NOT NULL,
                seed TEXT NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE OR REPLACE FUNCTION ledger_witness_attestations_reject_mutation() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'ledger_witness_attestations is insert-only';
            END;
            $$ LANGUAGE plpgsql
            "#,
            "DROP TRIGGER IF EXISTS ledger_witness_attestations_immutable ON ledger_witness_attestations",
            r#"
            CREATE TRIGGER ledger_witness_attestations_immutable
                BEFORE UPDATE OR DELETE ON ledger_witness_attestations
                FOR EACH ROW EXECUTE FUNCTION ledger_witness_attestations_reject_mutation()
            "#,
        ];
        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| WitnessError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn sequence_to_i64(sequence_number: u64) -> WitnessResult<i64> {
    i64::try_from(sequence_number)
        .map_err(|_| WitnessError::Backend("sequence number too large".into()))
}

fn row_to_attestation(row: PgRow) -> WitnessResult<WitnessAttestation> {
    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|e| WitnessError::Backend(e.to_string()))?;
    let witnesses: serde_json::Value = row
        .try_get("witnesses")
        .map_err(|e| WitnessError::Backend(e.to_string()))?;
    let recorded_at: DateTime<Utc> = row
        .try_get("recorded_at")
        .map_err(|e| WitnessError::Backend(e.to_string()))?;
    Ok(WitnessAttestation {
        sequence_number: u64::try_from(sequence_number).map_err(|_| {
            WitnessError::Serialization(format!("negative sequence number: {sequence_number}"))
        })?,
        witnesses: serde_json::from_value(witnesses)
            .map_err(|e| WitnessError::Serialization(e.to_string()))?,
        seed: row
            .try_get("seed")
            .map_err(|e| WitnessError::Backend(e.to_string()))?,
        recorded_at,
    })
}

#[async_trait]
impl AttestationStore for PostgresAttestationStore {
    async fn record(&self, attestation: &WitnessAttestation) -> WitnessResult<()> {
        let witnesses = serde_json::to_value(&attestation.witnesses)
            .map_err(|e| WitnessError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO ledger_witness_attestations \
             (sequence_number, witnesses, seed, recorded_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(sequence_to_i64(attestation.sequence_number)?)
        .bind(witnesses)
        .bind(&attestation.seed)
        .bind(attestation.recorded_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(WitnessError::DuplicateAttestation(attestation.sequence_number))
            }
            Err(e) => Err(WitnessError::Backend(e.to_string())),
        }
    }

    async fn get(&self, sequence_number: u64) -> WitnessResult<Option<WitnessAttestation>> {
        sqlx::query(
            "SELECT sequence_number, witnesses, seed, recorded_at \
             FROM ledger_witness_attestations WHERE sequence_number = $1",
        )
        .bind(sequence_to_i64(sequence_number)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WitnessError::Backend(e.to_string()))?
        .map(row_to_attestation)
        .transpose()
    }
}
