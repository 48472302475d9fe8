use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubflagError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Identifier lookup failed: {0}")]
    Lookup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network capabilities capped: {0}")]
    Security(String),

    #[error("Required collaborator missing: {0}")]
    MissingCollaborator(&'static str),

    #[error("Page context invalidated; pass results discarded")]
    ContextInvalidated,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PubflagError>;
