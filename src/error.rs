use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Webhook boundary errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Request signing errors
    #[error("Signature error: {0}")]
    Signature(String),

    // Order dispatch errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Exchange response malformed: {0}")]
    MalformedResponse(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
