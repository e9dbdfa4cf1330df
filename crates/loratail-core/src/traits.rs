use crate::error::OutputError;
use crate::frame::TelemetryFrame;
use std::future::Future;

/// Destination for decoded frames
///
/// Delivery is attempted once per frame; a failure is reported back to the
/// caller and never retried here.
pub trait FrameSink: Send {
    /// Returns the name of the sink (for logging)
    fn name(&self) -> &'static str;

    fn deliver(
        &mut self,
        frame: &TelemetryFrame,
    ) -> impl Future<Output = Result<(), OutputError>> + Send;
}

/// A sink that accepts and drops every frame
///
/// Useful for dry runs or for testing
pub struct DiscardSink;

impl FrameSink for DiscardSink {
    fn name(&self) -> &'static str {
        "discard"
    }

    async fn deliver(&mut self, _frame: &TelemetryFrame) -> Result<(), OutputError> {
        Ok(())
    }
}
