use loratail_core::IngestionError;
use std::collections::VecDeque;
use std::future::Future;

/// A lazy, non-restartable sequence of text lines
///
/// `None` marks the end of the sequence. A source that fails yields one
/// `Err` and then `None`.
pub trait LineSource: Send {
    fn next_line(&mut self) -> impl Future<Output = Option<Result<String, IngestionError>>> + Send;
}

/// Fixed lines, mostly useful for driving the assembler without a file
impl LineSource for VecDeque<String> {
    async fn next_line(&mut self) -> Option<Result<String, IngestionError>> {
        self.pop_front().map(Ok)
    }
}

/// Lines pushed from another task; ends when every sender is dropped
impl LineSource for tokio::sync::mpsc::Receiver<Result<String, IngestionError>> {
    async fn next_line(&mut self) -> Option<Result<String, IngestionError>> {
        self.recv().await
    }
}
