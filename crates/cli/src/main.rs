use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use audio2text_core::audio::infrastructure::ffmpeg_wav_converter::FfmpegWavConverter;
use audio2text_core::audio::infrastructure::whisper_recognizer::WhisperRecognizer;
use audio2text_core::job::domain::job_event::JobEvent;
use audio2text_core::job::job_notifier::LogJobNotifier;
use audio2text_core::job::job_orchestrator::{JobOrchestrator, JobStages, OrchestratorConfig};
use audio2text_core::resolver::domain::resource_reference::ResourceReference;
use audio2text_core::resolver::infrastructure::catalog_metadata_store::CatalogMetadataStore;
use audio2text_core::resolver::resource_resolver::{ResolverConfig, ResourceResolver};
use audio2text_core::runtime::native_runtime::{NativeLibrary, NativeRuntime};
use audio2text_core::shared::model_resolver::{self, ModelAssets, ModelSource};
use audio2text_core::shared::settings::Settings;

/// Transcribe an audio file or content reference to text.
#[derive(Parser)]
#[command(name = "audio2text")]
struct Cli {
    /// File path, file:// URI or content:// reference.
    reference: String,

    /// JSON metadata catalog used to resolve content references.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Mount point of the primary storage volume.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Directory for the converted audio file.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Directory holding (or receiving) the speech model.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Spoken language code, or "auto" to detect it.
    #[arg(long)]
    language: Option<String>,

    /// Inference threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Write the transcript here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = apply_overrides(Settings::load(), &cli);
    let reference: ResourceReference = cli.reference.parse()?;

    let store = match &settings.catalog_path {
        Some(path) => CatalogMetadataStore::load(path)?,
        None => CatalogMetadataStore::new(),
    };
    let resolver = ResourceResolver::new(
        Arc::new(store),
        ResolverConfig::new(&settings.external_storage_root),
    );

    let assets = resolve_model(&settings, cli.model_dir.clone())?;

    let converter = Arc::new(FfmpegWavConverter::new());
    let mut recognizer = WhisperRecognizer::new(assets.clone())
        .map_err(|e| -> Box<dyn std::error::Error> { e })?
        .with_language(settings.language.clone());
    if let Some(threads) = settings.threads {
        recognizer = recognizer.with_threads(threads);
    }
    let recognizer = Arc::new(recognizer);

    let runtime = NativeRuntime::new(vec![
        converter.clone() as Arc<dyn NativeLibrary>,
        recognizer.clone() as Arc<dyn NativeLibrary>,
    ]);
    runtime.init()?;

    let orchestrator = JobOrchestrator::new(
        runtime.clone(),
        JobStages {
            resolver,
            converter,
            recognizer,
            assets,
        },
        Arc::new(LogJobNotifier::default()),
        OrchestratorConfig::new(&settings.working_dir).with_retention(settings.retention()),
    );

    let job = orchestrator.submit(reference)?;
    let mut outcome = None;
    for event in orchestrator.subscribe(job)? {
        match event {
            JobEvent::State { state, .. } => log::debug!("{job}: {state}"),
            JobEvent::Progress(progress) => eprint!("\rTranscribing {}%", progress.percentage),
            JobEvent::Finished { outcome: done, .. } => outcome = Some(done),
        }
    }
    eprintln!();
    runtime.shutdown();

    let outcome = outcome.ok_or_else(|| format!("{job} ended without an outcome"))?;
    if let Some(kind) = outcome.error() {
        return Err(kind.into());
    }
    let text = outcome.text().unwrap_or_default();
    match &cli.output {
        Some(path) => {
            fs::write(path, format!("{text}\n"))?;
            log::info!("Transcript written to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(catalog) = &cli.catalog {
        settings.catalog_path = Some(catalog.clone());
    }
    if let Some(root) = &cli.storage_root {
        settings.external_storage_root = root.clone();
    }
    if let Some(dir) = &cli.work_dir {
        settings.working_dir = dir.clone();
    }
    if let Some(language) = &cli.language {
        settings.language = Some(language.clone());
    }
    if let Some(threads) = cli.threads {
        settings.threads = Some(threads);
    }
    settings
}

fn resolve_model(
    settings: &Settings,
    model_dir: Option<PathBuf>,
) -> Result<ModelAssets, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {}", settings.model_name);
    let mut source = ModelSource::in_user_cache(
        &settings.model_name,
        &settings.model_url,
        settings.bundled_model_dir.clone(),
    )?;
    if let Some(dir) = model_dir {
        source.cache_dir = dir;
    }
    let assets = model_resolver::resolve(&source, Some(Box::new(download_progress)))?;
    eprintln!();
    Ok(assets)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading speech model... {pct}%");
    } else {
        eprint!("\rDownloading speech model... {downloaded} bytes");
    }
}
