//! Error types for Conversion Flux

use thiserror::Error;

/// Errors surfaced by setup paths and host-facing adapters.
///
/// Runtime handlers never return these to the host page; they log and degrade.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("API key not found; tracking disabled")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid trace record: {0}")]
    InvalidTrace(String),
}

/// Synchronous transport failures.
///
/// Asynchronous failures (network, CORS) are swallowed inside the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Request construction failed: {0}")]
    Construction(String),

    #[error("Transport unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts() {
        fn post() -> Result<(), TrackerError> {
            let attempt: Result<(), TransportError> = Err(TransportError::Unavailable);
            attempt?;
            Ok(())
        }
        let err = post().unwrap_err();
        assert!(matches!(err, TrackerError::Transport(TransportError::Unavailable)));
        assert_eq!(err.to_string(), "Transport error: Transport unavailable");
    }

    #[test]
    fn test_json_error_converts() {
        let err: TrackerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Invalid JSON"));
    }
}
