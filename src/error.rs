use std::time::Duration;
use thiserror::Error;

/// Main error type for the cachet proxy server
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The first request line could not be parsed
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// HTTP request without a Host header
    #[error("No Host header found")]
    MissingHostHeader,

    /// Host matched the blocklist
    #[error("Host blocked by policy: {host}")]
    Blocked { host: String },

    /// DNS resolution failed
    #[error("Failed to resolve {host}: {message}")]
    Resolve { host: String, message: String },

    /// TCP connect to the origin failed
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// Writing the request to the origin failed
    #[error("Failed to send request to origin: {message}")]
    OriginSend { message: String },

    /// Origin closed the connection without sending any bytes
    #[error("Empty response from server")]
    EmptyOriginResponse,

    /// Writing to the client failed; the connection is torn down
    #[error("Failed to send response to client: {message}")]
    ClientSend { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// IO related errors
    #[error("IO error: {message}")]
    Io { message: String },
}

impl ProxyError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a malformed-request error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create a blocked-host error
    pub fn blocked<S: Into<String>>(host: S) -> Self {
        Self::Blocked { host: host.into() }
    }

    /// Create a resolve error
    pub fn resolve<H: Into<String>, S: Into<String>>(host: H, message: S) -> Self {
        Self::Resolve {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a connect error
    pub fn connect<H: Into<String>, S: Into<String>>(host: H, message: S) -> Self {
        Self::Connect {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an origin-send error
    pub fn origin_send<S: Into<String>>(message: S) -> Self {
        Self::OriginSend {
            message: message.into(),
        }
    }

    /// Create a client-send error
    pub fn client_send<S: Into<String>>(message: S) -> Self {
        Self::ClientSend {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Errors that increment the `errors` counter in the statistics sink
    pub fn counts_as_error(&self) -> bool {
        matches!(
            self,
            ProxyError::Resolve { .. }
                | ProxyError::Connect { .. }
                | ProxyError::OriginSend { .. }
                | ProxyError::EmptyOriginResponse
        )
    }
}

/// Result type alias for cachet operations
pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::io(err.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::io(format!("JSON serialization error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProxyError::timeout(Duration::from_secs(30), "operation")
    }
}
