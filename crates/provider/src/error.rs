//! Error types for provider initialization and evaluation.

/// Errors surfaced by providers during init or evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Capability not advertised by the provider.
    #[error("provider '{provider}' does not support capability '{capability}'")]
    UnknownCapability {
        provider: String,
        capability: String,
    },

    /// Condition payload did not match the capability's expected shape.
    #[error("invalid payload for capability '{capability}': {message}")]
    InvalidPayload {
        capability: String,
        message: String,
    },

    /// Malformed glob pattern in a payload.
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Malformed regular expression in a payload.
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// XML parse error while evaluating an `xml` condition.
    #[error("XML parse error in {path}: {message}")]
    Xml { path: String, message: String },

    /// Evaluation was cancelled before completion.
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
