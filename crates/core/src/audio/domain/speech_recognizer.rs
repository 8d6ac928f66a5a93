use std::path::Path;
use std::sync::Arc;

use crate::shared::model_resolver::ModelAssets;

/// Receives percentage updates from inside a running inference call.
///
/// May be invoked from any thread, any number of times, in any order.
pub type ProgressSink = Arc<dyn Fn(i32) + Send + Sync>;

pub type RecognizeError = Box<dyn std::error::Error + Send + Sync>;

/// Domain interface for speech-to-text transcription.
///
/// Implementations run inference on a converted audio file and return the
/// raw transcript, annotations included.
pub trait SpeechRecognizer: Send + Sync {
    fn transcribe(
        &self,
        assets: &ModelAssets,
        input: &Path,
        on_progress: ProgressSink,
    ) -> Result<String, RecognizeError>;
}
