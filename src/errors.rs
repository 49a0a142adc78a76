// src/errors.rs
use std::fmt;

/// Main error type for the sparrow-live tracking and notification core
#[derive(Debug)]
pub enum LiveError {
    // HTTP and API errors
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Http { status: u16, message: String },

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    Json(String),
    UnknownOrderStatus(String),

    // Session errors
    MissingCredential,

    // Configuration and setup errors
    ConfigurationError(String),
    InvalidConfiguration(String),
    Io(String),
}

impl fmt::Display for LiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            LiveError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            LiveError::NotFound(msg) => write!(f, "Not found: {}", msg),
            LiveError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),

            LiveError::NetworkTimeout => write!(f, "Network request timed out"),
            LiveError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            LiveError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            LiveError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            LiveError::Json(msg) => write!(f, "JSON error: {}", msg),
            LiveError::UnknownOrderStatus(status) => write!(f, "Unknown order status: {}", status),

            LiveError::MissingCredential => write!(f, "No bearer credential available for this session"),

            LiveError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            LiveError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            LiveError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for LiveError {}

// Convenience type alias for Results
pub type LiveResult<T> = Result<T, LiveError>;

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LiveError::NetworkTimeout
        } else if err.is_connect() {
            LiveError::NetworkConnection(err.to_string())
        } else if err.is_decode() {
            LiveError::Json(err.to_string())
        } else {
            LiveError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        LiveError::Json(err.to_string())
    }
}

impl From<std::io::Error> for LiveError {
    fn from(err: std::io::Error) -> Self {
        LiveError::Io(err.to_string())
    }
}

// Helper functions for creating common errors
impl LiveError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        LiveError::BadRequest(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        LiveError::InvalidConfiguration(msg.into())
    }

    /// Maps a non-success HTTP status to the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => LiveError::BadRequest(message),
            401 | 403 => LiveError::Unauthorized(message),
            404 => LiveError::NotFound(message),
            _ => LiveError::Http { status, message },
        }
    }

    /// Failures that the next poll cycle or reconnect may recover from.
    pub fn is_transient(&self) -> bool {
        match self {
            LiveError::NetworkTimeout
            | LiveError::NetworkConnection(_)
            | LiveError::HttpClient(_) => true,
            LiveError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
