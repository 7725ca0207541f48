//! Constitutional ledger primitives.
//!
//! This crate provides:
//! - deterministic canonical JSON (`canonicalize`)
//! - SHA-256 content hashing with `prev_hash` bound into the hashed content
//! - the immutable `Event` envelope and `ProposedEvent` candidate
//! - the fixed event-type registry
//! - the shared, one-way `HaltState`

pub mod canonical;
pub mod error;
pub mod event;
pub mod event_type;
pub mod halt;
pub mod hash;

pub use canonical::{canonicalize, canonicalize_serializable};
pub use error::ChainError;
pub use event::{Event, EventParts, EventSignature, ProposedEvent, SignatureAlgorithm};
pub use event_type::{EventTypeRegistry, EventTypeSpec, TransitionSpec};
pub use halt::{HaltState, HaltStatus, SystemHalted};
pub use hash::{
    compute_content_hash, expected_prev_hash, hashable_content, is_well_formed_hash, sha256_hex,
    GENESIS_PREV_HASH, HASH_ALGORITHM,
};
