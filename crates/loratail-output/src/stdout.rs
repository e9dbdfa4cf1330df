use chrono::{DateTime, Utc};
use loratail_core::{OutputError, TelemetryFrame};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::debug;

/// Output format for frame reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable block, one reading per line
    #[default]
    Pretty,
    /// Compact JSON (one line per frame)
    Json,
}

impl OutputFormat {
    /// Parse a format name, falling back to pretty
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Pretty,
        }
    }
}

#[derive(Serialize)]
struct FrameReport<'a> {
    received_at: DateTime<Utc>,
    #[serde(flatten)]
    frame: &'a TelemetryFrame,
}

/// Writes ingested frames to stdout for the operator
pub struct StdoutReporter {
    format: OutputFormat,
    stdout: Stdout,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self::with_format(OutputFormat::default())
    }

    pub fn with_format(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: tokio::io::stdout(),
        }
    }

    /// Write a single frame to stdout
    pub async fn report(&mut self, frame: &TelemetryFrame) -> Result<(), OutputError> {
        let output = self.format_frame(frame, Utc::now())?;

        self.stdout
            .write_all(output.as_bytes())
            .await
            .map_err(|e| OutputError::Stdout(e.to_string()))?;

        self.stdout
            .write_all(b"\n")
            .await
            .map_err(|e| OutputError::Stdout(e.to_string()))?;

        self.stdout
            .flush()
            .await
            .map_err(|e| OutputError::Stdout(e.to_string()))?;

        debug!(format = ?self.format, "Wrote frame to stdout");
        Ok(())
    }

    fn format_frame(&self, frame: &TelemetryFrame, at: DateTime<Utc>) -> Result<String, OutputError> {
        match self.format {
            OutputFormat::Pretty => Ok(self.format_pretty(frame, at)),
            OutputFormat::Json => serde_json::to_string(&FrameReport {
                received_at: at,
                frame,
            })
            .map_err(|e| OutputError::Serialization(e.to_string())),
        }
    }

    fn format_pretty(&self, frame: &TelemetryFrame, at: DateTime<Utc>) -> String {
        let mut lines = vec![format!(
            "[{}] Ingested message:",
            at.format("%Y-%m-%d %H:%M:%S%.3f")
        )];
        for (name, value) in frame.readings() {
            lines.push(format!(" - {}: {:.2}", name, value));
        }
        lines.join("\n")
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}
