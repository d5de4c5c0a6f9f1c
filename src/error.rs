use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no student with roll {0}")]
    NotFound(i32),

    #[error("no student named {0:?}")]
    NameNotFound(String),

    #[error("roll {0} already exists")]
    DuplicateKey(i32),

    #[error("invalid value: {0}")]
    Validation(String),

    #[error("failed to access {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons an assessment could not come from the service. Always absorbed
/// into the local fallback.
#[derive(Debug, Error)]
pub enum AssessError {
    #[error("no credential in ${0}")]
    NoCredential(String),

    #[error("request failed: {0}")]
    Network(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable service reply: {0}")]
    TransportParse(String),

    #[error("assistant reply is not a JSON object: {0}")]
    AssistantParse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source,
        }
    }
}
