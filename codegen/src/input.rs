//! Loading the protocol schema document from disk or over HTTP.

use crate::error::CodegenError;
use log::{debug, info, warn};
use shared::schema::ProtocolSchema;
use std::path::PathBuf;

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reads the raw document text from a file path or an `http(s)` URL.
pub async fn read_input(input: &str) -> Result<String, CodegenError> {
    if is_url(input) {
        info!("Fetching schema from {}", input);
        let fetch_error = |source| CodegenError::Fetch {
            url: input.to_string(),
            source,
        };
        let response = reqwest::get(input)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?;
        response.text().await.map_err(fetch_error)
    } else {
        debug!("Reading schema from {}", input);
        tokio::fs::read_to_string(input)
            .await
            .map_err(|source| CodegenError::Read {
                path: PathBuf::from(input),
                source,
            })
    }
}

/// Loads and parses the document. A stale embedded hash is only a warning.
pub async fn load_schema(input: &str) -> Result<ProtocolSchema, CodegenError> {
    let text = read_input(input).await?;
    let schema = ProtocolSchema::from_json(&text)?;

    match schema.compute_hash() {
        Ok(hash) if hash == schema.schema_hash => {
            debug!("Schema hash {} verified", hash);
        }
        Ok(hash) => warn!(
            "Schema hash {} does not match its contents ({}), clients will be rejected by strict servers",
            schema.schema_hash, hash
        ),
        Err(e) => warn!("Could not verify schema hash: {}", e),
    }

    info!(
        "Loaded schema {} with {} lands and {} definitions",
        schema.schema_hash,
        schema.lands.len(),
        schema.defs.len()
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("http://localhost:8080/schema.json"));
        assert!(is_url("https://example.com/schema.json"));
        assert!(!is_url("./schema.json"));
        assert!(!is_url("httpdocs/schema.json"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = tokio_test::block_on(read_input("/nonexistent/statesync/schema.json"))
            .unwrap_err();
        match err {
            CodegenError::Read { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/statesync/schema.json"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_document_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"version\": 1}").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let err = tokio_test::block_on(load_schema(&path)).unwrap_err();
        assert!(matches!(err, CodegenError::Parse(_)));
    }
}
