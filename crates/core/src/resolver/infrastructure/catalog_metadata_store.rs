use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::resolver::domain::metadata_store::{MetadataError, MetadataStore};
use crate::resolver::domain::resource_reference::ContentUri;

/// One row of a collection: its id and materialized file location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: u64,
    pub data: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    collections: HashMap<String, Vec<CatalogRow>>,
}

/// Metadata store backed by an in-memory catalog of collections.
///
/// Collections are addressed by their content URI. A query against the
/// collection itself returns every row (or the row matching `row_id`); a
/// query against `<collection>/<id>` returns that single row.
///
/// The catalog can be loaded from JSON:
///
/// ```json
/// { "collections": { "content://media/external/audio/media": [ { "id": 42, "data": "/sdcard/a.mp3" } ] } }
/// ```
#[derive(Debug, Default)]
pub struct CatalogMetadataStore {
    collections: HashMap<ContentUri, Vec<CatalogRow>>,
}

impl CatalogMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let json = fs::read_to_string(path).map_err(|e| MetadataError::Load(e.into()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| MetadataError::Load(e.into()))?;
        let mut store = Self::new();
        for (uri, rows) in file.collections {
            let collection: ContentUri = uri.parse().map_err(|e| MetadataError::Load(Box::new(e)))?;
            for row in rows {
                store.insert(&collection, row.id, &row.data);
            }
        }
        log::debug!(
            "Loaded metadata catalog with {} collections",
            store.collections.len()
        );
        Ok(store)
    }

    pub fn insert(&mut self, collection: &ContentUri, id: u64, data: &str) {
        let rows = self.collections.entry(collection.clone()).or_default();
        rows.retain(|r| r.id != id);
        rows.push(CatalogRow {
            id,
            data: data.to_string(),
        });
    }

    pub fn with_row(mut self, collection: &str, id: u64, data: &str) -> Self {
        match collection.parse::<ContentUri>() {
            Ok(uri) => self.insert(&uri, id, data),
            Err(e) => log::warn!("Ignoring catalog row for {collection}: {e}"),
        }
        self
    }

    fn rows_matching(rows: &[CatalogRow], row_id: Option<u64>) -> Vec<String> {
        rows.iter()
            .filter(|r| row_id.map_or(true, |id| r.id == id))
            .map(|r| r.data.clone())
            .collect()
    }
}

impl MetadataStore for CatalogMetadataStore {
    fn query_data(
        &self,
        uri: &ContentUri,
        row_id: Option<u64>,
    ) -> Result<Vec<String>, MetadataError> {
        if let Some(rows) = self.collections.get(uri) {
            return Ok(Self::rows_matching(rows, row_id));
        }

        if let Some((collection, item_id)) = uri.split_row_id() {
            if row_id.is_some_and(|id| id != item_id) {
                return Ok(Vec::new());
            }
            if let Some(rows) = self.collections.get(&collection) {
                return Ok(Self::rows_matching(rows, Some(item_id)));
            }
        }

        Ok(Vec::new())
    }
}
