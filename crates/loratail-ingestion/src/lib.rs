//! loratail Ingestion
//!
//! Follows the receiver log and reassembles telemetry frames from it.

pub mod assembler;
pub mod file;
pub mod source;

pub use assembler::{AssemblerStats, FrameAssembler};
pub use file::FileTail;
pub use source::LineSource;

use loratail_core::IngestEvent;
use tokio::sync::mpsc;

/// Capacity of the assembler to governor hand-off
///
/// A single slot keeps the producer at most one event ahead of the consumer.
pub const EVENT_CHANNEL_SIZE: usize = 1;

/// Create the channel that carries ingest events to the governor
pub fn create_event_channel() -> (mpsc::Sender<IngestEvent>, mpsc::Receiver<IngestEvent>) {
    mpsc::channel(EVENT_CHANNEL_SIZE)
}
