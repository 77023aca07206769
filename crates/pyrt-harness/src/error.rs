//! Harness failures. Runtime failures are data (rendered into case output),
//! not harness errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no fixture files found in {0}")]
    NoFixtures(PathBuf),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("missing or malformed input `{field}`")]
    BadInput { field: &'static str },
}
