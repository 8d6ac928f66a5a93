use std::path::{Path, PathBuf};
use std::sync::Mutex;

use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use crate::audio::domain::audio_segment::AudioSegment;
use crate::audio::domain::speech_recognizer::{ProgressSink, RecognizeError, SpeechRecognizer};
use crate::runtime::native_runtime::{LibraryError, NativeLibrary};
use crate::shared::constants::WHISPER_SAMPLE_RATE;
use crate::shared::model_resolver::ModelAssets;

struct LoadedModel {
    path: PathBuf,
    context: WhisperContext,
}

/// Speech recognizer using whisper.cpp via whisper-rs.
///
/// The model is loaded once (at runtime init, or on first use) and reused
/// for every job until the runtime unloads it.
pub struct WhisperRecognizer {
    assets: ModelAssets,
    language: Option<String>,
    n_threads: usize,
    model: Mutex<Option<LoadedModel>>,
}

impl WhisperRecognizer {
    pub fn new(assets: ModelAssets) -> Result<Self, RecognizeError> {
        if !assets.model_path().exists() {
            return Err(format!(
                "Whisper model not found at: {}",
                assets.model_path().display()
            )
            .into());
        }
        Ok(Self {
            assets,
            language: None,
            n_threads: num_cpus().min(4),
            model: Mutex::new(None),
        })
    }

    /// Language code to decode with; `None` or `"auto"` lets whisper detect it.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.is_empty() && l != "auto");
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    pub fn model_path(&self) -> &Path {
        self.assets.model_path()
    }

    fn ensure_loaded(&self, path: &Path) -> Result<WhisperState, RecognizeError> {
        let mut guard = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let reuse = guard.as_ref().is_some_and(|m| m.path == path);
        if !reuse {
            let context = WhisperContext::new_with_params(
                path.to_str().ok_or("Invalid model path")?,
                WhisperContextParameters::default(),
            )
            .map_err(|e| format!("Failed to load Whisper model: {e}"))?;
            log::info!("Loaded Whisper model {}", path.display());
            *guard = Some(LoadedModel {
                path: path.to_path_buf(),
                context,
            });
        }
        let model = guard.as_ref().ok_or("Whisper model not loaded")?;
        let state = model
            .context
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;
        Ok(state)
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn transcribe(
        &self,
        assets: &ModelAssets,
        input: &Path,
        on_progress: ProgressSink,
    ) -> Result<String, RecognizeError> {
        let audio = read_wav_mono(input)?;
        log::info!(
            "Transcribing {} ({:.1}s of audio)",
            input.display(),
            audio.duration()
        );

        let mut state = self.ensure_loaded(assets.model_path())?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_deref().unwrap_or("auto")));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_n_threads(self.n_threads as i32);
        params.set_progress_callback_safe(move |progress: i32| on_progress(progress));

        state
            .full(params, audio.samples())
            .map_err(|e| format!("Whisper inference failed: {e}"))?;

        let mut text = String::new();
        let num_segments = state.full_n_segments();

        for seg_idx in 0..num_segments {
            let segment = match state.get_segment(seg_idx) {
                Some(s) => s,
                None => continue,
            };

            for tok_idx in 0..segment.n_tokens() {
                let token = match segment.get_token(tok_idx) {
                    Some(t) => t,
                    None => continue,
                };
                // Special tokens ([_BEG_], [_TT_n], ...) are kept; they are
                // stripped with the other bracketed annotations afterwards.
                if let Ok(piece) = token.to_str() {
                    text.push_str(piece);
                }
            }
        }

        Ok(text)
    }
}

impl NativeLibrary for WhisperRecognizer {
    fn name(&self) -> &str {
        "whisper"
    }

    fn load(&self) -> Result<(), LibraryError> {
        self.ensure_loaded(self.assets.model_path()).map(|_| ())
    }

    fn unload(&self) {
        let mut guard = self.model.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            log::info!("Freed Whisper model {}", self.assets.model_path().display());
        }
    }
}

/// Reads a 16 kHz, 16-bit, mono or stereo WAV file as mono f32 samples.
fn read_wav_mono(path: &Path) -> Result<AudioSegment, RecognizeError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| format!("Failed to open WAV file {}: {e}", path.display()))?;
    let spec = reader.spec();

    if spec.channels != 1 && spec.channels != 2 {
        return Err(format!("WAV file {} must be mono or stereo", path.display()).into());
    }
    if spec.sample_rate != WHISPER_SAMPLE_RATE {
        return Err(format!(
            "WAV file {} must be {WHISPER_SAMPLE_RATE} Hz, got {}",
            path.display(),
            spec.sample_rate
        )
        .into());
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(format!("WAV file {} must be 16-bit PCM", path.display()).into());
    }

    let pcm = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to read WAV samples: {e}"))?;
    Ok(AudioSegment::from_pcm16_mono(&pcm, spec.sample_rate, spec.channels))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
