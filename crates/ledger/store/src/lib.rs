//! Append-only event storage for the constitutional ledger.
//!
//! This crate provides:
//! - reader/writer trait boundaries over the hash-linked event table
//! - compare-and-swap append: sequence assignment and chain-link check commit
//!   together or not at all
//! - an in-memory store for tests, local runtime use and embedding
//! - a PostgreSQL store (feature `postgres`) with an immutability trigger
//!
//! No trait in this crate exposes update or delete.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryEventStore;
pub use traits::{ChainHead, EventReader, EventStore, EventWriter};
