//! Integrity verification for the constitutional ledger.
//!
//! [`HashVerifier`] walks the stored chain recomputing every content hash
//! and link. The first mismatch is written to the [`BreachLog`], the failed
//! scan is recorded, and the shared halt state is triggered. Breach records
//! live outside the event chain because the chain itself is what is in doubt.
//!
//! [`ContinuousVerifier`] runs scans on an interval until shut down or halted.
//!
//! Scan history and breach records have in-memory stores and, behind the
//! `postgres` feature, insert-only PostgreSQL tables.

pub mod breach;
pub mod continuous;
pub mod error;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod scan;
pub mod verifier;

pub use breach::{BreachKind, BreachListener, BreachLog, BreachRecord, InMemoryBreachLog};
pub use continuous::{
    ContinuousVerifier, ScanSchedule, VerificationStatus, VerifierHandle, MIN_SCAN_INTERVAL,
};
pub use error::{IntegrityError, IntegrityResult};
pub use scan::{HashScanResult, HashScanStatus, InMemoryScanRecordStore, ScanRecordStore, ScanScope};
pub use verifier::HashVerifier;
