use thiserror::Error;

/// Boundary-level failures. Nothing inside the state machine or router throws one of
/// these; they surface only from config loading and backend registry operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("backend {0:?} is already registered")]
    BackendExists(String),

    #[error("backend {0:?} is not registered")]
    BackendNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
