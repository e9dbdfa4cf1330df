use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for loratail
#[derive(Debug, Error)]
pub enum LoraTailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Error budget exhausted after {faults} fault(s) (ceiling {ceiling})")]
    BudgetExhausted { faults: u32, ceiling: u32 },
}

/// Errors raised while loading TLS material
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read {kind} '{}': {message}", .path.display())]
    Unreadable {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Malformed {kind} '{}': {message}", .path.display())]
    Malformed {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to build TLS client: {0}")]
    Client(String),
}

impl CredentialError {
    /// Path of the file that caused the error, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            CredentialError::Unreadable { path, .. } | CredentialError::Malformed { path, .. } => {
                Some(path)
            }
            CredentialError::Client(_) => None,
        }
    }
}

/// Errors from the line source and frame reassembly
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Line source error: {0}")]
    Source(String),

    #[error("Buffer overflow without match ({size} bytes, limit {limit})")]
    BufferOverflow { size: usize, limit: usize },

    #[error("Invalid numeral '{raw}' for field {field}")]
    InvalidNumeral { field: &'static str, raw: String },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Errors talking to the collector or writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Request to {endpoint} failed: {message}")]
    Delivery { endpoint: String, message: String },

    #[error("Stdout write error: {0}")]
    Stdout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for loratail operations
pub type Result<T> = std::result::Result<T, LoraTailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_names_file() {
        let err = CredentialError::Malformed {
            kind: "CA certificate",
            path: PathBuf::from("/etc/cas/broken.pem"),
            message: "no PEM certificate found".to_string(),
        };
        assert!(err.to_string().contains("/etc/cas/broken.pem"));
        assert_eq!(err.path(), Some(std::path::Path::new("/etc/cas/broken.pem")));
    }

    #[test]
    fn test_budget_message() {
        let err = LoraTailError::BudgetExhausted {
            faults: 11,
            ceiling: 10,
        };
        assert_eq!(
            err.to_string(),
            "Error budget exhausted after 11 fault(s) (ceiling 10)"
        );
    }
}
