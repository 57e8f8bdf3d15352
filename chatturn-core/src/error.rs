//! Error types for chatturn operations

/// Result type for chatturn operations
pub type Result<T> = std::result::Result<T, ChatTurnError>;

/// Error types for the turn processor and its providers
#[derive(Debug, thiserror::Error)]
pub enum ChatTurnError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The completion request could not be sent or was rejected
    #[error("Provider error: {0}")]
    Provider(String),

    /// Failure while reading a streamed reply
    #[error("Stream error: {0}")]
    Stream(String),
}
