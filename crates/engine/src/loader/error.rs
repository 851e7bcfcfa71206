//! Error types for rule loading.

/// Errors that reject a rule file or rule set at load time.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Structural validation error (duplicate IDs, bad chain shape, ...).
    /// The message names the offending file and rule.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;
