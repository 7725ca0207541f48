//! Signing and verification for constitutional ledger events.
//!
//! Every event is signed by the key its actor holds at creation time. Keys
//! live in a temporal registry: rotation closes a window, nothing is ever
//! deleted, so historical events keep verifying against the key that was
//! active when they were written.

#![deny(unsafe_code)]

pub mod error;
pub mod key;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod registry;
pub mod service;
pub mod source;

pub use error::{SigningError, SigningResult};
pub use key::{generate_agent_key, AgentKey};
pub use registry::{InMemoryKeyRegistry, KeyRegistry};
pub use service::{signable_content, SigningService};
pub use source::{InMemoryKeySource, KeySource};
