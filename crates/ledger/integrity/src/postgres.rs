//! PostgreSQL breach log and scan history.
//!
//! Both tables are insert-only: a row trigger rejects UPDATE and DELETE, so
//! a breach recorded before a halt outlives the process that found it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::breach::{BreachLog, BreachRecord};
use crate::error::{IntegrityError, IntegrityResult};
use crate::scan::{HashScanResult, ScanRecordStore};

async fn run_ddl(pool: &PgPool, ddl: &[&str]) -> IntegrityResult<()> {
    for stmt in ddl {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| IntegrityError::Backend(format!("schema init failed: {e}")))?;
    }
    Ok(())
}

const REJECT_MUTATION_FN: &str = r#"
    CREATE OR REPLACE FUNCTION ledger_integrity_reject_mutation() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION '% is insert-only', TG_TABLE_NAME;
    END;
    $$ LANGUAGE plpgsql
"#;

fn to_body<T: Serialize>(value: &T) -> IntegrityResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| IntegrityError::Serialization(e.to_string()))
}

fn from_row<T: DeserializeOwned>(row: PgRow) -> IntegrityResult<T> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| IntegrityError::Backend(e.to_string()))?;
    serde_json::from_value(body).map_err(|e| IntegrityError::Serialization(e.to_string()))
}

fn sequence_to_i64(sequence_number: Option<u64>) -> IntegrityResult<Option<i64>> {
    sequence_number
        .map(|seq| {
            i64::try_from(seq)
                .map_err(|_| IntegrityError::Backend("sequence number too large".into()))
        })
        .transpose()
}

/// Breach records in `ledger_integrity_breaches`.
#[derive(Clone)]
pub struct PostgresBreachLog {
    pool: PgPool,
}

impl PostgresBreachLog {
    pub async fn from_pool(pool: PgPool) -> IntegrityResult<Self> {
        run_ddl(
            &pool,
            &[
                r#"
                CREATE TABLE IF NOT EXISTS ledger_integrity_breaches (
                    position BIGSERIAL PRIMARY KEY,
                    breach_id UUID NOT NULL UNIQUE,
                    kind TEXT NOT NULL,
                    sequence_number BIGINT,
                    scan_id UUID,
                    body JSONB NOT NULL,
                    detected_at TIMESTAMPTZ NOT NULL
                )
                "#,
                REJECT_MUTATION_FN,
                "DROP TRIGGER IF EXISTS ledger_integrity_breaches_immutable ON ledger_integrity_breaches",
                r#"
                CREATE TRIGGER ledger_integrity_breaches_immutable
                    BEFORE UPDATE OR DELETE ON ledger_integrity_breaches
                    FOR EACH ROW EXECUTE FUNCTION ledger_integrity_reject_mutation()
                "#,
            ],
        )
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl BreachLog for PostgresBreachLog {
    async fn record(&self, breach: &BreachRecord) -> IntegrityResult<()> {
        sqlx::query(
            "INSERT INTO ledger_integrity_breaches \
             (breach_id, kind, sequence_number, scan_id, body, detected_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(breach.breach_id)
        .bind(breach.kind.label())
        .bind(sequence_to_i64(breach.sequence_number)?)
        .bind(breach.scan_id)
        .bind(to_body(breach)?)
        .bind(breach.detected_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IntegrityError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list(&self) -> IntegrityResult<Vec<BreachRecord>> {
        sqlx::query("SELECT body FROM ledger_integrity_breaches ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IntegrityError::Backend(e.to_string()))?
            .into_iter()
            .map(from_row)
            .collect()
    }
}

/// Scan history in `ledger_integrity_scans`.
#[derive(Clone)]
pub struct PostgresScanRecordStore {
    pool: PgPool,
}

impl PostgresScanRecordStore {
    pub async fn from_pool(pool: PgPool) -> IntegrityResult<Self> {
        run_ddl(
            &pool,
            &[
                r#"
                CREATE TABLE IF NOT EXISTS ledger_integrity_scans (
                    position BIGSERIAL PRIMARY KEY,
                    scan_id UUID NOT NULL UNIQUE,
                    status TEXT NOT NULL,
                    failed_sequence BIGINT,
                    body JSONB NOT NULL,
                    finished_at TIMESTAMPTZ NOT NULL
                )
                "#,
                REJECT_MUTATION_FN,
                "DROP TRIGGER IF EXISTS ledger_integrity_scans_immutable ON ledger_integrity_scans",
                r#"
                CREATE TRIGGER ledger_integrity_scans_immutable
                    BEFORE UPDATE OR DELETE ON ledger_integrity_scans
                    FOR EACH ROW EXECUTE FUNCTION ledger_integrity_reject_mutation()
                "#,
            ],
        )
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ScanRecordStore for PostgresScanRecordStore {
    async fn record(&self, result: &HashScanResult) -> IntegrityResult<()> {
        let status = if result.passed() { "passed" } else { "failed" };
        sqlx::query(
            "INSERT INTO ledger_integrity_scans \
             (scan_id, status, failed_sequence, body, finished_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(result.scan_id)
        .bind(status)
        .bind(sequence_to_i64(result.failed_sequence)?)
        .bind(to_body(result)?)
        .bind(result.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IntegrityError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn latest(&self) -> IntegrityResult<Option<HashScanResult>> {
        sqlx::query("SELECT body FROM ledger_integrity_scans ORDER BY position DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IntegrityError::Backend(e.to_string()))?
            .map(from_row)
            .transpose()
    }

    async fn list(&self) -> IntegrityResult<Vec<HashScanResult>> {
        sqlx::query("SELECT body FROM ledger_integrity_scans ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IntegrityError::Backend(e.to_string()))?
            .into_iter()
            .map(from_row)
            .collect()
    }
}
