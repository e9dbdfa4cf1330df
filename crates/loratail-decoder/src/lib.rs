//! loratail Decoder
//!
//! Extracts telemetry frames from free-text receiver output.

pub mod decoder;

pub use decoder::{Decoded, FrameDecoder, FIELD_LABELS};
