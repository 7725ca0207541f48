//! Constitutional event ledger service.
//!
//! [`ConstitutionalLedger`] ties the pieces together: write-time validation,
//! signing, compare-and-swap append, witness selection and attestation,
//! collusion defense and continuous hash verification, all gated by one
//! shared [`HaltState`](ledger_types::HaltState).
//!
//! The `ledgerd` binary runs continuous verification, one-off scans and
//! exports over a configured backend.

pub mod actors;
pub mod bridge;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
#[cfg(feature = "replay-tooling")]
pub mod replay;
pub mod runtime;

pub use actors::KeyRegistryActors;
pub use bridge::WitnessBreachReporter;
pub use config::{LedgerConfig, StorageConfig};
pub use error::{LedgerServiceError, LedgerServiceResult};
pub use export::{CompleteExport, ExportMetadata, ExportVerification};
pub use ledger::{ConstitutionalLedger, LedgerParts, INVESTIGATION_RESOLVED};
#[cfg(feature = "replay-tooling")]
pub use replay::ReplayWriter;
pub use runtime::{open_ledger, parts_from_config};
