use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::resolver::domain::metadata_store::{MetadataError, MetadataStore};
use crate::resolver::domain::resource_reference::{ContentUri, ResourceReference};
use crate::shared::constants::{
    AUDIO_COLLECTION_URI, DOWNLOADS_AUTHORITY, EXTERNAL_STORAGE_AUTHORITY, IMAGES_COLLECTION_URI,
    MEDIA_AUTHORITY, PRIMARY_VOLUME, PUBLIC_DOWNLOADS_URI, RAW_PATH_PREFIX, VIDEO_COLLECTION_URI,
};

/// Why a reference could not be turned into a local path.
///
/// Every variant surfaces to job observers as the same
/// `UnresolvableReference` kind; the detail only reaches the log.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("unsupported provider authority {0:?}")]
    UnsupportedAuthority(String),
    #[error("unsupported storage volume {0:?}")]
    UnsupportedVolume(String),
    #[error("unsupported media type {0:?}")]
    UnsupportedMediaType(String),
    #[error("malformed document id {0:?}")]
    MalformedDocumentId(String),
    #[error("no metadata row for {0}")]
    NotFound(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Provider locations the resolver needs to know about.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub external_storage_root: PathBuf,
    pub public_downloads: ContentUri,
    pub images_collection: ContentUri,
    pub video_collection: ContentUri,
    pub audio_collection: ContentUri,
}

impl ResolverConfig {
    pub fn new(external_storage_root: impl Into<PathBuf>) -> Self {
        Self {
            external_storage_root: external_storage_root.into(),
            public_downloads: known_uri(PUBLIC_DOWNLOADS_URI, "downloads", &["public_downloads"]),
            images_collection: known_uri(IMAGES_COLLECTION_URI, "media", &["external", "images", "media"]),
            video_collection: known_uri(VIDEO_COLLECTION_URI, "media", &["external", "video", "media"]),
            audio_collection: known_uri(AUDIO_COLLECTION_URI, "media", &["external", "audio", "media"]),
        }
    }
}

fn known_uri(raw: &str, authority: &str, segments: &[&str]) -> ContentUri {
    raw.parse()
        .unwrap_or_else(|_| ContentUri::new(authority, segments))
}

/// Turns scheme- and authority-tagged references into local file paths.
///
/// No existence check is made here; a path that vanished before conversion
/// is caught by the orchestrator.
pub struct ResourceResolver {
    store: Arc<dyn MetadataStore>,
    config: ResolverConfig,
}

impl ResourceResolver {
    pub fn new(store: Arc<dyn MetadataStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    pub fn resolve(&self, reference: &ResourceReference) -> Result<PathBuf, ResolveError> {
        match reference {
            ResourceReference::File(path) => Ok(path.clone()),
            ResourceReference::Content(uri) => self.lookup(uri, None),
            ResourceReference::Document {
                authority,
                document_id,
            } => self.resolve_document(authority, document_id),
            ResourceReference::Other { scheme, .. } => {
                Err(ResolveError::UnsupportedScheme(scheme.clone()))
            }
        }
    }

    fn resolve_document(&self, authority: &str, document_id: &str) -> Result<PathBuf, ResolveError> {
        match authority {
            EXTERNAL_STORAGE_AUTHORITY => self.resolve_external_storage(document_id),
            DOWNLOADS_AUTHORITY => self.resolve_download(document_id),
            MEDIA_AUTHORITY => self.resolve_media(document_id),
            other => Err(ResolveError::UnsupportedAuthority(other.to_string())),
        }
    }

    fn resolve_external_storage(&self, document_id: &str) -> Result<PathBuf, ResolveError> {
        let (volume, relative) = split_document_id(document_id)?;
        if !volume.eq_ignore_ascii_case(PRIMARY_VOLUME) {
            return Err(ResolveError::UnsupportedVolume(volume.to_string()));
        }
        Ok(join_relative(&self.config.external_storage_root, relative))
    }

    fn resolve_download(&self, document_id: &str) -> Result<PathBuf, ResolveError> {
        if let Some(raw) = document_id.strip_prefix(RAW_PATH_PREFIX) {
            return Ok(PathBuf::from(raw));
        }
        let row_id = parse_row_id(document_id, document_id)?;
        let uri = self.config.public_downloads.with_appended_id(row_id);
        self.lookup(&uri, None)
    }

    fn resolve_media(&self, document_id: &str) -> Result<PathBuf, ResolveError> {
        let (media_type, row) = split_document_id(document_id)?;
        let row_id = parse_row_id(row, document_id)?;
        let collection = match media_type {
            "image" => &self.config.images_collection,
            "video" => &self.config.video_collection,
            "audio" => &self.config.audio_collection,
            other => return Err(ResolveError::UnsupportedMediaType(other.to_string())),
        };
        self.lookup(collection, Some(row_id))
    }

    fn lookup(&self, uri: &ContentUri, row_id: Option<u64>) -> Result<PathBuf, ResolveError> {
        log::debug!("Querying metadata for {uri} (row {row_id:?})");
        self.store
            .query_data(uri, row_id)?
            .into_iter()
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| match row_id {
                Some(id) => ResolveError::NotFound(format!("{uri} row {id}")),
                None => ResolveError::NotFound(uri.to_string()),
            })
    }
}

fn split_document_id(document_id: &str) -> Result<(&str, &str), ResolveError> {
    document_id
        .split_once(':')
        .ok_or_else(|| ResolveError::MalformedDocumentId(document_id.to_string()))
}

fn parse_row_id(row: &str, document_id: &str) -> Result<u64, ResolveError> {
    row.parse::<u64>()
        .map_err(|_| ResolveError::MalformedDocumentId(document_id.to_string()))
}

fn join_relative(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::infrastructure::catalog_metadata_store::CatalogMetadataStore;
    use rstest::rstest;

    const ROOT: &str = "/storage/emulated/0";

    fn resolver() -> ResourceResolver {
        let store = CatalogMetadataStore::new()
            .with_row(AUDIO_COLLECTION_URI, 7, "/storage/emulated/0/Music/seven.mp3")
            .with_row(VIDEO_COLLECTION_URI, 8, "/storage/emulated/0/Movies/eight.mp4")
            .with_row(PUBLIC_DOWNLOADS_URI, 12, "/storage/emulated/0/Download/twelve.ogg")
            .with_row("content://media/audio/items", 42, "/storage/emulated/0/Music/song.mp3");
        ResourceResolver::new(Arc::new(store), ResolverConfig::new(ROOT))
    }

    fn document(authority: &str, document_id: &str) -> ResourceReference {
        ResourceReference::Document {
            authority: authority.to_string(),
            document_id: document_id.to_string(),
        }
    }

    #[test]
    fn test_file_reference_is_returned_unchanged() {
        let reference = ResourceReference::File(PathBuf::from("/does/not/exist.mp3"));
        let path = resolver().resolve(&reference).unwrap();
        assert_eq!(path, PathBuf::from("/does/not/exist.mp3"));
    }

    #[test]
    fn test_generic_content_reference_uses_item_lookup() {
        let reference: ResourceReference = "content://media/audio/items/42".parse().unwrap();
        let path = resolver().resolve(&reference).unwrap();
        assert_eq!(path, PathBuf::from("/storage/emulated/0/Music/song.mp3"));
    }

    #[test]
    fn test_generic_content_reference_without_rows_fails() {
        let reference: ResourceReference = "content://media/audio/items/43".parse().unwrap();
        let err = resolver().resolve(&reference).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[rstest]
    #[case::primary("primary:Music/a.mp3", "/storage/emulated/0/Music/a.mp3")]
    #[case::primary_upper("PRIMARY:Music/a.mp3", "/storage/emulated/0/Music/a.mp3")]
    #[case::leading_slash("primary:/Podcasts/b.mp3", "/storage/emulated/0/Podcasts/b.mp3")]
    fn test_primary_storage_documents(#[case] document_id: &str, #[case] expected: &str) {
        let path = resolver()
            .resolve(&document(EXTERNAL_STORAGE_AUTHORITY, document_id))
            .unwrap();
        assert_eq!(path, PathBuf::from(expected));
    }

    #[test]
    fn test_secondary_volume_is_unsupported() {
        let err = resolver()
            .resolve(&document(EXTERNAL_STORAGE_AUTHORITY, "1A2B-3C4D:Music/a.mp3"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedVolume(v) if v == "1A2B-3C4D"));
    }

    #[test]
    fn test_raw_download_strips_marker() {
        let path = resolver()
            .resolve(&document(DOWNLOADS_AUTHORITY, "raw:/storage/emulated/0/Download/x.wav"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/storage/emulated/0/Download/x.wav"));
    }

    #[test]
    fn test_download_row_id_looks_up_public_downloads() {
        let path = resolver()
            .resolve(&document(DOWNLOADS_AUTHORITY, "12"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/storage/emulated/0/Download/twelve.ogg"));
    }

    #[rstest]
    #[case::audio("audio:7", "/storage/emulated/0/Music/seven.mp3")]
    #[case::video("video:8", "/storage/emulated/0/Movies/eight.mp4")]
    fn test_media_documents(#[case] document_id: &str, #[case] expected: &str) {
        let path = resolver()
            .resolve(&document(MEDIA_AUTHORITY, document_id))
            .unwrap();
        assert_eq!(path, PathBuf::from(expected));
    }

    #[test]
    fn test_unknown_media_type_is_unsupported() {
        let err = resolver()
            .resolve(&document(MEDIA_AUTHORITY, "document:3"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedMediaType(_)));
    }

    #[rstest]
    #[case::media_missing_colon(MEDIA_AUTHORITY, "audio7")]
    #[case::media_non_numeric_row(MEDIA_AUTHORITY, "audio:seven")]
    #[case::media_empty_row(MEDIA_AUTHORITY, "audio:")]
    #[case::storage_missing_colon(EXTERNAL_STORAGE_AUTHORITY, "primaryMusic")]
    #[case::download_non_numeric(DOWNLOADS_AUTHORITY, "msf:abc")]
    fn test_malformed_document_ids(#[case] authority: &str, #[case] document_id: &str) {
        let err = resolver()
            .resolve(&document(authority, document_id))
            .unwrap_err();
        assert!(
            matches!(err, ResolveError::MalformedDocumentId(_)),
            "expected malformed id, got {err:?}"
        );
    }

    #[test]
    fn test_missing_media_row_is_not_found() {
        let err = resolver()
            .resolve(&document(MEDIA_AUTHORITY, "image:99"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_unknown_authority_is_unsupported() {
        let err = resolver()
            .resolve(&document("com.example.provider", "1"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedAuthority(_)));
    }

    #[test]
    fn test_other_scheme_is_unsupported() {
        let reference: ResourceReference = "https://example.com/a.mp3".parse().unwrap();
        let err = resolver().resolve(&reference).unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedScheme(s) if s == "https"));
    }
}
