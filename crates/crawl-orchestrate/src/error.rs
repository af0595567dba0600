//! Crate-wide error enum, one variant per failure kind the orchestrator
//! must distinguish to decide count-and-continue vs. abort.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("config error: {0}")]
    Config(String),
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: crawl_fetch::FetchError,
    },
    #[error("job {0} exhausted its retry budget")]
    JobFailed(String),
    #[error("schema missing for {entity_type}: {path}")]
    SchemaNotFound { entity_type: String, path: PathBuf },
    #[error("cannot write run manifest: {0}")]
    Fatal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, OrchestrateError>;
