use shared::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of one `codegen` run. Every variant ends the run.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid protocol schema: {0}")]
    Parse(#[from] SchemaError),

    #[error("land id '{0}' cannot be used as a file name")]
    InvalidLandId(String),

    #[error("failed to write {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
