use crate::governor::{Governor, GovernorReport, TerminationReason};
use loratail_core::config::Config;
use loratail_core::{FrameSink, IngestEvent, IngestionError, LoraTailError, Result};
use loratail_ingestion::{create_event_channel, AssemblerStats, FileTail, FrameAssembler, LineSource};
use loratail_output::{OutputFormat, StdoutReporter};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One producer (line source + assembler) feeding one governor
///
/// The producer runs as its own task; the governor runs on the caller's task.
/// When the governor stops, the producer is cancelled and awaited.
pub struct Pipeline<S: FrameSink> {
    assembler: FrameAssembler,
    governor: Governor<S>,
    cancel: CancellationToken,
}

impl<S: FrameSink> Pipeline<S> {
    pub fn new(assembler: FrameAssembler, governor: Governor<S>) -> Self {
        Self {
            assembler,
            governor,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a pipeline from configuration, delivering frames to `sink`
    pub fn from_config(config: &Config, sink: S) -> Self {
        let assembler = FrameAssembler::from_config(&config.ingestion);
        let mut governor = Governor::from_config(&config.governor, sink);
        if config.output.stdout.enabled {
            let format = OutputFormat::parse(&config.output.stdout.format);
            governor = governor.with_reporter(StdoutReporter::with_format(format));
        }
        Self::new(assembler, governor)
    }

    /// Token that stops the producer when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run against an already-open line source
    pub async fn run<L: LineSource + 'static>(self, source: L) -> Result<GovernorReport> {
        let Self {
            assembler,
            governor,
            cancel,
        } = self;
        let (sender, receiver) = create_event_channel();

        let producer = tokio::spawn(assembler.run(source, sender, cancel.clone()));
        Self::finish(governor, receiver, producer, cancel).await
    }

    /// Tail `path` from its current end and run until the pipeline stops
    ///
    /// A file that cannot be opened, or that fails while being tailed, is
    /// reported to the governor as one fault, after which the stream closes
    /// and the source error is returned.
    pub async fn run_file(self, path: impl Into<PathBuf>, poll_interval: Duration) -> Result<GovernorReport> {
        let Self {
            assembler,
            governor,
            cancel,
        } = self;
        let path = path.into();
        let (sender, receiver) = create_event_channel();

        let token = cancel.clone();
        let max_line = assembler.max_buffer();
        let producer = tokio::spawn(async move {
            match FileTail::open(&path, poll_interval).await {
                Ok(tail) => assembler.run(tail.with_max_line(max_line), sender, token).await,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to start line source");
                    let _ = sender.send(IngestEvent::Fault(e.to_string())).await;
                    Err(e)
                }
            }
        });

        Self::finish(governor, receiver, producer, cancel).await
    }

    async fn finish(
        governor: Governor<S>,
        receiver: mpsc::Receiver<IngestEvent>,
        producer: tokio::task::JoinHandle<std::result::Result<AssemblerStats, IngestionError>>,
        cancel: CancellationToken,
    ) -> Result<GovernorReport> {
        let report = governor.run(receiver).await;
        cancel.cancel();

        let source_failure = match producer.await {
            Ok(Ok(stats)) => {
                info!(lines = stats.lines, "Producer finished");
                None
            }
            Ok(Err(e @ IngestionError::Source(_))) => {
                warn!(error = %e, "Line source failed");
                Some(e)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Producer stopped with error");
                None
            }
            Err(e) => {
                error!(error = %e, "Producer task failed");
                Some(IngestionError::Source(format!("producer task failed: {}", e)))
            }
        };

        match (report.reason, source_failure) {
            (TerminationReason::BudgetExhausted, _) => Err(LoraTailError::BudgetExhausted {
                faults: report.budget_count,
                ceiling: report.budget_ceiling,
            }),
            (TerminationReason::SourceClosed, Some(e)) => Err(LoraTailError::Ingestion(e)),
            (TerminationReason::SourceClosed, None) => Ok(report),
        }
    }
}
