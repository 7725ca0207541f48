use std::time::Duration;

/// Timing limits for the write-time pipeline.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Upper bound on any single projection read. Exceeding it rejects the
    /// write as `ProjectionUnavailable`.
    pub projection_timeout: Duration,
    /// Expected ceiling for the hash-chain check (default: 50ms).
    pub hash_chain_budget: Duration,
    /// Expected ceiling for the state-transition check (default: 10ms).
    pub state_transition_budget: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            projection_timeout: Duration::from_millis(250),
            hash_chain_budget: Duration::from_millis(50),
            state_transition_budget: Duration::from_millis(10),
        }
    }
}
