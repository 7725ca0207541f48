use std::time::Duration;

use async_trait::async_trait;
use ledger_types::{compute_content_hash, expected_prev_hash};

use super::{ValidationStage, WriteValidator};
use crate::error::WriteTimeValidationError;
use crate::pipeline::ValidationContext;

/// Recomputes the content hash and checks the link to the current head.
pub struct HashChainValidator {
    budget: Duration,
}

impl HashChainValidator {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

#[async_trait]
impl WriteValidator for HashChainValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::HashChain
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.budget)
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), WriteTimeValidationError> {
        let proposal = ctx.proposal;

        let recomputed =
            compute_content_hash(&proposal.event_type, &proposal.payload, &proposal.prev_hash);
        if recomputed != proposal.content_hash {
            return Err(WriteTimeValidationError::ContentHashMismatch {
                expected: recomputed,
                actual: proposal.content_hash.clone(),
            });
        }

        let expected = expected_prev_hash(ctx.head.map(|h| h.content_hash.as_str()));
        if proposal.prev_hash != expected {
            return Err(WriteTimeValidationError::HashChainBreak {
                expected: expected.to_owned(),
                actual: proposal.prev_hash.clone(),
            });
        }

        Ok(())
    }
}
