use std::path::PathBuf;

/// Errors raised while loading policy configuration or validating a crisis
/// decision.
///
/// Config variants are recovered by the loaders (they log and fall back to
/// defaults). `SchemaViolation` is the one variant that must reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy config not found: {}", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("malformed policy config {}: {message}", path.display())]
    ConfigMalformed { path: PathBuf, message: String },

    #[error("escalate_deadline_seconds is {seconds}, must be <= {max}")]
    DeadlineExceeded { seconds: u64, max: u64 },

    #[error("crisis decision violates schema at {path}: {message}")]
    SchemaViolation { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        PolicyError::ConfigMalformed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for the config-layer variants that loaders recover from.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PolicyError::ConfigMissing { .. }
                | PolicyError::ConfigMalformed { .. }
                | PolicyError::DeadlineExceeded { .. }
                | PolicyError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Read a config file, mapping "not found" to `ConfigMissing`.
pub(crate) fn read_config(path: &std::path::Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PolicyError::ConfigMissing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(PolicyError::Io(e)),
    }
}
