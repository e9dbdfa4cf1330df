//! loratail Core
//!
//! Core types, errors and configuration for the loratail telemetry ingestor.

pub mod config;
pub mod error;
pub mod frame;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use error::{CredentialError, IngestionError, LoraTailError, OutputError, Result};
pub use frame::{IngestEvent, TelemetryFrame};
pub use traits::{DiscardSink, FrameSink};
