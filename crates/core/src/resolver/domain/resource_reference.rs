use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceParseError {
    #[error("empty resource reference")]
    Empty,
    #[error("malformed resource reference {raw:?}: {reason}")]
    Malformed { raw: String, reason: String },
}

/// A `content://authority/segment/...` address inside a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentUri {
    authority: String,
    segments: Vec<String>,
}

impl ContentUri {
    pub fn new(authority: &str, segments: &[&str]) -> Self {
        Self {
            authority: authority.to_string(),
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Address of the row `id` inside this collection.
    pub fn with_appended_id(&self, id: u64) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Self {
            authority: self.authority.clone(),
            segments,
        }
    }

    /// Splits an item address into its collection and trailing row id.
    pub fn split_row_id(&self) -> Option<(ContentUri, u64)> {
        let (last, rest) = self.segments.split_last()?;
        let id = last.parse::<u64>().ok()?;
        Some((
            ContentUri {
                authority: self.authority.clone(),
                segments: rest.to_vec(),
            },
            id,
        ))
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content://{}", self.authority)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ContentUri {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<ResourceReference>()? {
            ResourceReference::Content(uri) => Ok(uri),
            _ => Err(ReferenceParseError::Malformed {
                raw: s.to_string(),
                reason: "not a content address".to_string(),
            }),
        }
    }
}

/// A user-selected audio asset, tagged by scheme and provider authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceReference {
    /// A path on the local filesystem.
    File(PathBuf),
    /// Opaque provider content with no document id.
    Content(ContentUri),
    /// A provider document carrying a compound `docId` (e.g. `primary:Music/a.mp3`).
    Document { authority: String, document_id: String },
    /// A scheme the resolver does not understand.
    Other { scheme: String, raw: String },
}

impl ResourceReference {
    pub fn scheme(&self) -> &str {
        match self {
            ResourceReference::File(_) => "file",
            ResourceReference::Content(_) | ResourceReference::Document { .. } => "content",
            ResourceReference::Other { scheme, .. } => scheme,
        }
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceReference::File(path) => write!(f, "{}", path.display()),
            ResourceReference::Content(uri) => write!(f, "{uri}"),
            ResourceReference::Document {
                authority,
                document_id,
            } => write!(
                f,
                "content://{authority}/document/{}",
                urlencoding::encode(document_id)
            ),
            ResourceReference::Other { raw, .. } => f.write_str(raw),
        }
    }
}

/// A bare filesystem path rather than a URI: absolute, relative, or a
/// drive-letter path such as `C:\Music\a.mp3`.
fn is_plain_path(raw: &str) -> bool {
    if raw.contains("://") {
        return false;
    }
    let bytes = raw.as_bytes();
    let drive_letter = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');
    drive_letter || raw.starts_with('/') || !raw.contains(':')
}

impl FromStr for ResourceReference {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ReferenceParseError::Empty);
        }
        if is_plain_path(raw) {
            return Ok(ResourceReference::File(PathBuf::from(raw)));
        }

        let malformed = |reason: String| ReferenceParseError::Malformed {
            raw: raw.to_string(),
            reason,
        };
        let url = Url::parse(raw).map_err(|e| malformed(e.to_string()))?;

        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .or_else(|_| decode(url.path()).map(PathBuf::from))
                    .map_err(|_| malformed("undecodable file path".to_string()))?;
                Ok(ResourceReference::File(path))
            }
            "content" => {
                let authority = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| malformed("missing authority".to_string()))?
                    .to_string();
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                    .unwrap_or_default();

                if let Some(document_id) = document_id_segment(&segments) {
                    let document_id =
                        decode(document_id).map_err(|_| malformed("undecodable document id".to_string()))?;
                    return Ok(ResourceReference::Document {
                        authority,
                        document_id,
                    });
                }

                let segments = segments
                    .iter()
                    .map(|seg| decode(seg))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| malformed("undecodable path segment".to_string()))?;
                Ok(ResourceReference::Content(ContentUri {
                    authority,
                    segments,
                }))
            }
            scheme => Ok(ResourceReference::Other {
                scheme: scheme.to_string(),
                raw: raw.to_string(),
            }),
        }
    }
}

/// `document/<id>` or `tree/<tree>/document/<id>`.
fn document_id_segment<'a>(segments: &[&'a str]) -> Option<&'a str> {
    match segments {
        ["document", id] | ["tree", _, "document", id] => Some(*id),
        _ => None,
    }
}

fn decode(s: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(s).map(|c| c.into_owned())
}
