use thiserror::Error;

/// Crate-wide error type. Each variant maps to one of the error kinds in the
/// design: transport failures are retried by connectors before ever reaching
/// here, auth degradation is swallowed at the connector boundary and never
/// constructs this variant in practice (kept for completeness / tests).
#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth degraded (401/403) for source `{source_id}`")]
    AuthDegraded { source_id: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<serde_yaml::Error> for CuratorError {
    fn from(e: serde_yaml::Error) -> Self {
        CuratorError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CuratorError>;
