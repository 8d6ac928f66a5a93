use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create model directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Opaque handle to the bundled inference assets.
///
/// The orchestrator never looks inside; only the recognizer does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssets {
    model_path: PathBuf,
}

impl ModelAssets {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

/// Where to look for a model and where to fetch it from if it is missing.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub name: String,
    pub url: String,
    pub cache_dir: PathBuf,
    pub bundled_dir: Option<PathBuf>,
}

impl ModelSource {
    /// Source rooted at the platform cache directory.
    pub fn in_user_cache(
        name: &str,
        url: &str,
        bundled_dir: Option<PathBuf>,
    ) -> Result<Self, ModelResolveError> {
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            cache_dir: model_cache_dir()?,
            bundled_dir,
        })
    }
}

/// Resolve model assets, checking local locations before downloading.
///
/// Resolution order:
/// 1. Cache directory
/// 2. Bundled directory (pre-packaged installs)
/// 3. Download from URL into the cache
pub fn resolve(
    source: &ModelSource,
    progress: Option<ProgressFn>,
) -> Result<ModelAssets, ModelResolveError> {
    let cached_path = source.cache_dir.join(&source.name);
    if cached_path.exists() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(ModelAssets::new(cached_path));
    }

    if let Some(dir) = &source.bundled_dir {
        let bundled_path = dir.join(&source.name);
        if bundled_path.exists() {
            log::debug!("Using bundled model {}", bundled_path.display());
            return Ok(ModelAssets::new(bundled_path));
        }
    }

    fs::create_dir_all(&source.cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading model {} from {}", source.name, source.url);
    download(&source.url, &cached_path, progress)?;
    Ok(ModelAssets::new(cached_path))
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Audio2Text/models/`
/// - Linux: `$XDG_CACHE_HOME/Audio2Text/models/` or `~/.cache/Audio2Text/models/`
/// - Windows: `%LOCALAPPDATA%/Audio2Text/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Audio2Text").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Audio2Text").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    save_stream(response, total, dest, progress)
}

/// Streams `reader` into `dest` through a `.part` file, which is removed on
/// any error.
fn save_stream(
    reader: impl Read,
    total: u64,
    dest: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = save_stream_inner(reader, total, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn save_stream_inner(
    mut reader: impl Read,
    total: u64,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |e: std::io::Error| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;
    let mut downloaded: u64 = 0;

    // 1MB reads keep large models out of RAM and report real progress.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
