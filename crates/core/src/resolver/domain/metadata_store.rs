use thiserror::Error;

use super::resource_reference::ContentUri;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata query on {uri} failed: {reason}")]
    Query { uri: String, reason: String },
    #[error("failed to load metadata catalog: {0}")]
    Load(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain interface for the platform's resource-metadata service.
///
/// Implementations return the materialized-location column of every row
/// matching `uri`, optionally narrowed to a single row id. An empty result
/// is not an error.
pub trait MetadataStore: Send + Sync {
    fn query_data(
        &self,
        uri: &ContentUri,
        row_id: Option<u64>,
    ) -> Result<Vec<String>, MetadataError>;
}
