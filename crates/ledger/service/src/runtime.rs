use std::sync::Arc;

use ledger_signing::KeySource;
use ledger_types::HaltState;
use tracing::info;

use crate::config::{LedgerConfig, StorageConfig};
use crate::error::LedgerServiceResult;
use crate::ledger::{ConstitutionalLedger, LedgerParts};

/// Backends selected by `storage`.
pub async fn parts_from_config(
    storage: &StorageConfig,
    key_source: Arc<dyn KeySource>,
) -> LedgerServiceResult<LedgerParts> {
    match storage {
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            Ok(LedgerParts::in_memory(key_source))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            use ledger_integrity::postgres::{PostgresBreachLog, PostgresScanRecordStore};
            use ledger_signing::postgres::PostgresKeyRegistry;
            use ledger_store::postgres::PostgresEventStore;
            use ledger_witness::postgres::{PostgresAttestationStore, PostgresInvestigationStore};

            let store = Arc::new(
                PostgresEventStore::connect_with_options(
                    url,
                    *max_connections,
                    *connect_timeout_secs,
                )
                .await?,
            );
            let pool = store.pool().clone();
            let keys = PostgresKeyRegistry::from_pool(pool.clone()).await?;
            let investigations = PostgresInvestigationStore::from_pool(pool.clone()).await?;
            let attestations = PostgresAttestationStore::from_pool(pool.clone()).await?;
            let breaches = PostgresBreachLog::from_pool(pool.clone()).await?;
            let scans = PostgresScanRecordStore::from_pool(pool).await?;
            info!(max_connections = *max_connections, "Using PostgreSQL storage");

            Ok(LedgerParts::in_memory(key_source)
                .with_store(store)
                .with_keys(Arc::new(keys))
                .with_investigations(Arc::new(investigations))
                .with_attestations(Arc::new(attestations))
                .with_breaches(Arc::new(breaches))
                .with_scans(Arc::new(scans)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(crate::error::LedgerServiceError::Config(
            "postgres storage requested but ledgerd was built without the `postgres` feature"
                .into(),
        )),
    }
}

/// Open a ledger for `config` with a fresh halt state.
pub async fn open_ledger(
    config: &LedgerConfig,
    key_source: Arc<dyn KeySource>,
) -> LedgerServiceResult<ConstitutionalLedger> {
    let parts = parts_from_config(&config.storage, key_source).await?;
    ConstitutionalLedger::assemble(parts, config, HaltState::shared()).await
}
