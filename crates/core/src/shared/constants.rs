pub const WHISPER_MODEL_NAME: &str = "ggml-small.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin";
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Extension of the converted file handed to the recognizer.
pub const CONVERTED_EXTENSION: &str = "wav";

pub const EXTERNAL_STORAGE_AUTHORITY: &str = "com.android.externalstorage.documents";
pub const DOWNLOADS_AUTHORITY: &str = "com.android.providers.downloads.documents";
pub const MEDIA_AUTHORITY: &str = "com.android.providers.media.documents";

pub const PRIMARY_VOLUME: &str = "primary";
pub const RAW_PATH_PREFIX: &str = "raw:";

pub const PUBLIC_DOWNLOADS_URI: &str = "content://downloads/public_downloads";
pub const IMAGES_COLLECTION_URI: &str = "content://media/external/images/media";
pub const VIDEO_COLLECTION_URI: &str = "content://media/external/video/media";
pub const AUDIO_COLLECTION_URI: &str = "content://media/external/audio/media";

/// How long a finished job stays available for late subscribers.
pub const DEFAULT_RETENTION_SECS: u64 = 600;
