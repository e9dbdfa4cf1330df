//! loratail Output
//!
//! HTTP transport, collector client and operator reporting for loratail.

pub mod collector;
pub mod stdout;
pub mod transport;

pub use collector::CollectorClient;
pub use stdout::{OutputFormat, StdoutReporter};
pub use transport::{Transport, TransportBuilder, TransportCredentials, TrustSource, TrustStore};
