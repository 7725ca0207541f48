//! Configuration for the ledger service and `ledgerd`.

use std::time::Duration;

use ledger_gate::GateConfig;
use ledger_witness::CollusionConfig;
use serde::{Deserialize, Serialize};

/// Main ledger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Write-time validation timings
    #[serde(default)]
    pub gate: GateSettings,

    /// Witness pool and draw size
    #[serde(default)]
    pub witness: WitnessSettings,

    /// Collusion detection thresholds
    #[serde(default)]
    pub collusion: CollusionConfig,

    /// Continuous verification
    #[serde(default)]
    pub verification: VerificationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_projection_timeout")]
    pub projection_timeout_ms: u64,

    #[serde(default = "default_hash_chain_budget")]
    pub hash_chain_budget_ms: u64,

    #[serde(default = "default_state_transition_budget")]
    pub state_transition_budget_ms: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            projection_timeout_ms: default_projection_timeout(),
            hash_chain_budget_ms: default_hash_chain_budget(),
            state_transition_budget_ms: default_state_transition_budget(),
        }
    }
}

impl GateSettings {
    pub fn to_gate_config(&self) -> GateConfig {
        GateConfig {
            projection_timeout: Duration::from_millis(self.projection_timeout_ms),
            hash_chain_budget: Duration::from_millis(self.hash_chain_budget_ms),
            state_transition_budget: Duration::from_millis(self.state_transition_budget_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessSettings {
    /// Witness identities eligible for selection
    #[serde(default = "default_witness_pool")]
    pub pool: Vec<String>,

    /// Witnesses drawn per appended event
    #[serde(default = "default_witnesses_per_event")]
    pub witnesses_per_event: usize,
}

impl Default for WitnessSettings {
    fn default() -> Self {
        Self {
            pool: default_witness_pool(),
            witnesses_per_event: default_witnesses_per_event(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Seconds between scheduled scans
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,

    /// Events read per page during a scan
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Scan only the most recent N events instead of the full chain
    #[serde(default)]
    pub window: Option<u64>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            page_size: default_page_size(),
            window: None,
        }
    }
}

impl VerificationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_projection_timeout() -> u64 {
    250
}

fn default_hash_chain_budget() -> u64 {
    50
}

fn default_state_transition_budget() -> u64 {
    10
}

fn default_witness_pool() -> Vec<String> {
    (1..=5).map(|i| format!("witness-{i}")).collect()
}

fn default_witnesses_per_event() -> usize {
    3
}

fn default_scan_interval() -> u64 {
    300
}

fn default_page_size() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LedgerConfig {
    /// Load configuration from defaults, an optional file and `LEDGER__*`
    /// environment variables (`LEDGER__VERIFICATION__INTERVAL_SECS=60`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&LedgerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Field names contain underscores, so nesting uses a double one.
        builder = builder.add_source(
            config::Environment::with_prefix("LEDGER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the components would refuse at startup.
    pub fn validate(&self) -> Result<(), String> {
        self.collusion.validate().map_err(|e| e.to_string())?;
        if self.witness.witnesses_per_event == 0 {
            return Err("witness.witnesses_per_event must be positive".into());
        }
        if self.witness.pool.len() < self.witness.witnesses_per_event {
            return Err(format!(
                "witness pool has {} members but {} are drawn per event",
                self.witness.pool.len(),
                self.witness.witnesses_per_event
            ));
        }
        if self.verification.page_size == 0 {
            return Err("verification.page_size must be positive".into());
        }
        if self.verification.window == Some(0) {
            return Err("verification.window must be positive when set".into());
        }
        Ok(())
    }
}
