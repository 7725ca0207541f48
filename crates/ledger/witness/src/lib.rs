//! Witnessing for the constitutional ledger.
//!
//! Each appended event is attested by a small set of witnesses drawn from a
//! pool with unpredictable but reproducible selection. Collusion defense
//! watches which witness pairs keep appearing together in breaches; a pair
//! whose correlation crosses the threshold is suspended at once and put
//! under investigation. A suspended or banned pair is never selected.

pub mod attestation;
pub mod config;
pub mod defense;
pub mod entropy;
pub mod error;
pub mod investigation;
pub mod pair;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod selector;
pub mod store;

pub use attestation::{AttestationStore, InMemoryAttestationStore, WitnessAttestation};
pub use config::CollusionConfig;
pub use defense::{BreachObservation, CollusionDefense, ObservationKind};
pub use entropy::{EntropySource, FixedEntropySource, OsEntropySource};
pub use error::{WitnessError, WitnessResult};
pub use investigation::{
    Investigation, InvestigationStatus, InvestigationTrigger, PairStatus, ResolutionOutcome,
};
pub use pair::WitnessPair;
pub use selector::{WitnessSelection, WitnessSelector};
pub use store::{InMemoryInvestigationStore, InvestigationStore};
