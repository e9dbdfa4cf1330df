use crate::error::LoraTailError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for loratail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Line source and frame reassembly
    pub ingestion: IngestionConfig,

    /// Error budget policy
    pub governor: GovernorConfig,

    /// Remote collector and transport
    pub collector: CollectorConfig,

    /// Operator-facing output
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, LoraTailError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoraTailError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, LoraTailError> {
        toml::from_str(content)
            .map_err(|e| LoraTailError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, LoraTailError> {
        toml::to_string_pretty(self)
            .map_err(|e| LoraTailError::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Node name used in log output
    pub instance_name: String,

    /// Internal log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: "loratail".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// What the assembler does with a field whose numeral matched but did not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumeralPolicy {
    /// Emit a fault and drop the buffered text
    #[default]
    Reject,
    /// Substitute zero for the field and emit the frame anyway
    ZeroFill,
}

/// Line source and reassembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// File to tail
    pub file: Option<PathBuf>,

    /// Accumulation buffer ceiling in bytes
    pub max_buffer_bytes: usize,

    /// Interval for re-checking the file when no notification arrives
    pub poll_interval_ms: u64,

    pub numeral_policy: NumeralPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_buffer_bytes: 4096,
            poll_interval_ms: 1000,
            numeral_policy: NumeralPolicy::default(),
        }
    }
}

/// How the error budget counts faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Faults accumulate for the lifetime of the pipeline
    #[default]
    Cumulative,
    /// A successful frame resets the count
    Consecutive,
}

/// Ingestion governor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Faults tolerated before the pipeline stops (stops once exceeded)
    pub error_ceiling: u32,

    pub budget_policy: BudgetPolicy,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            error_ceiling: 10,
            budget_policy: BudgetPolicy::default(),
        }
    }
}

/// Collector endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collector address as host:port
    pub endpoint: String,

    /// Per-request timeout
    pub timeout_seconds: u64,

    /// Mutual TLS material; all three must be set to enable it
    pub tls: TlsConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:3000".to_string(),
            timeout_seconds: 5,
            tls: TlsConfig::default(),
        }
    }
}

/// Paths to client identity and trusted CAs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// A PEM bundle or a directory of PEM files
    pub trusted_cas: Option<PathBuf>,
}

impl TlsConfig {
    /// True when cert, key and trusted CAs are all present
    pub fn is_complete(&self) -> bool {
        self.cert.is_some() && self.key.is_some() && self.trusted_cas.is_some()
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub stdout: StdoutConfig,
}

/// Stdout frame report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    pub enabled: bool,
    /// Format: pretty, json
    pub format: String,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "pretty".to_string(),
        }
    }
}
