use thiserror::Error;

/// Errors surfaced by the engine and the worker protocol.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("no geometry set")]
    NotReady,

    #[error("simulation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
