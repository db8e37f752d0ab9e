use std::path::PathBuf;

/// Concept-table loading errors. Callers recover by disabling expansion
/// (`λ = 0`).
#[derive(Debug, thiserror::Error)]
pub enum ConceptError {
    #[error("concept table not found: {}", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("malformed concept table {}: {message}", path.display())]
    ConfigMalformed { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConceptError>;
