use crate::source::LineSource;
use loratail_core::config::IngestionConfig;
use loratail_core::{IngestEvent, IngestionError};
use loratail_decoder::{Decoded, FrameDecoder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default accumulation buffer ceiling in bytes
pub const DEFAULT_MAX_BUFFER: usize = 4096;

/// Counters reported when the assembler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub lines: u64,
    pub frames: u64,
    pub faults: u64,
}

/// Reassembles frames from fragmented lines
///
/// Owns the single accumulation buffer of a pipeline. Lines are appended
/// verbatim, without a separator, and the buffer is decoded after every line.
pub struct FrameAssembler {
    decoder: FrameDecoder,
    buffer: String,
    max_buffer: usize,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub fn new(decoder: FrameDecoder, max_buffer: usize) -> Self {
        Self {
            decoder,
            buffer: String::new(),
            max_buffer,
            stats: AssemblerStats::default(),
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(
            FrameDecoder::new(config.numeral_policy),
            config.max_buffer_bytes,
        )
    }

    /// Bytes currently held in the accumulation buffer
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Append one line and decode; yields at most one event
    pub fn push_line(&mut self, line: &str) -> Option<IngestEvent> {
        self.stats.lines += 1;
        self.buffer.push_str(line);

        match self.decoder.decode(&self.buffer) {
            Decoded::Frame(frame) => {
                debug!(buffered = self.buffer.len(), "Frame decoded");
                self.buffer.clear();
                self.stats.frames += 1;
                return Some(IngestEvent::Frame(frame));
            }
            Decoded::Invalid { field, raw } => {
                self.buffer.clear();
                self.stats.faults += 1;
                let fault = IngestionError::InvalidNumeral { field, raw };
                return Some(IngestEvent::Fault(fault.to_string()));
            }
            Decoded::Incomplete => {}
        }

        if self.buffer.len() > self.max_buffer {
            let fault = IngestionError::BufferOverflow {
                size: self.buffer.len(),
                limit: self.max_buffer,
            };
            warn!(size = self.buffer.len(), limit = self.max_buffer, "Resetting accumulation buffer");
            self.buffer.clear();
            self.stats.faults += 1;
            return Some(IngestEvent::Fault(fault.to_string()));
        }

        None
    }

    /// Drive `source` until it ends, the receiver goes away, or `cancel` fires
    ///
    /// A source error is forwarded as one final fault and then returned, so
    /// the caller can tell a failed source from one that simply ended.
    /// Dropping `sender` on return closes the event stream for the consumer.
    pub async fn run<S: LineSource>(
        mut self,
        mut source: S,
        sender: mpsc::Sender<IngestEvent>,
        cancel: CancellationToken,
    ) -> Result<AssemblerStats, IngestionError> {
        info!(max_buffer = self.max_buffer, "Starting frame assembler");
        let mut failure = None;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Frame assembler cancelled");
                    break;
                }
                next = source.next_line() => next,
            };

            let event = match next {
                Some(Ok(line)) => match self.push_line(&line) {
                    Some(event) => event,
                    None => continue,
                },
                Some(Err(e)) => {
                    error!(error = %e, "Line source failed");
                    self.stats.faults += 1;
                    let event = IngestEvent::Fault(e.to_string());
                    failure = Some(e);
                    event
                }
                None => {
                    info!("Line source ended");
                    break;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Frame assembler cancelled");
                    break;
                }
                sent = sender.send(event) => {
                    if sent.is_err() {
                        warn!("Channel closed, stopping frame assembler");
                        return Err(IngestionError::ChannelClosed);
                    }
                }
            }

            if failure.is_some() {
                break;
            }
        }

        info!(
            lines = self.stats.lines,
            frames = self.stats.frames,
            faults = self.stats.faults,
            "Frame assembler stopped"
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(FrameDecoder::default(), DEFAULT_MAX_BUFFER)
    }
}
