use std::path::PathBuf;
use sukoon_policy::PolicyError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Only schema violations on the crisis path reach this far; config
    /// problems are absorbed at load time.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("eval config {}: {message}", path.display())]
    EvalConfig { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
