use std::ffi::OsString;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::audio::domain::audio_converter::{AudioConverter, CONVERSION_OK};
use crate::audio::domain::speech_recognizer::{ProgressSink, SpeechRecognizer};
use crate::job::domain::job_event::JobSnapshot;
use crate::job::domain::job_state::{JobId, JobState};
use crate::job::domain::outcome::{ErrorKind, Outcome};
use crate::job::job_notifier::{JobNotifier, NullJobNotifier};
use crate::job::progress_relay::{ProgressRelay, Subscription};
use crate::job::transcript_cleaner::strip_annotations;
use crate::resolver::domain::resource_reference::ResourceReference;
use crate::resolver::resource_resolver::ResourceResolver;
use crate::runtime::native_runtime::NativeRuntime;
use crate::shared::constants::{CONVERTED_EXTENSION, DEFAULT_RETENTION_SECS};
use crate::shared::model_resolver::ModelAssets;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("{active} is still running")]
    JobAlreadyRunning { active: JobId },
    #[error("native runtime is not initialized")]
    NotInitialized,
    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

impl OrchestratorError {
    /// The job-level failure kind this rejection corresponds to, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OrchestratorError::JobAlreadyRunning { .. } => Some(ErrorKind::JobAlreadyRunning),
            _ => None,
        }
    }
}

/// The collaborators a job runs through, in order.
pub struct JobStages {
    pub resolver: ResourceResolver,
    pub converter: Arc<dyn AudioConverter>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub assets: ModelAssets,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Private directory holding the converted file of the latest job.
    pub working_dir: PathBuf,
    /// How long a finished job stays available to late subscribers.
    pub retention: Duration,
}

impl OrchestratorConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Runs one transcription job at a time on a background thread.
///
/// A job moves `Resolving → Converting → Inferring` and ends `Succeeded` or
/// `Failed`. Observers attach through [`subscribe`](Self::subscribe) at any
/// point, including after the job finished, and the job keeps running when
/// every observer has gone away.
pub struct JobOrchestrator {
    runtime: Arc<NativeRuntime>,
    worker: Arc<JobWorker>,
    slot: Mutex<Option<Arc<ProgressRelay>>>,
    next_id: AtomicU64,
    retention: Duration,
}

impl JobOrchestrator {
    pub fn new(
        runtime: Arc<NativeRuntime>,
        stages: JobStages,
        notifier: Arc<dyn JobNotifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            worker: Arc::new(JobWorker {
                stages,
                notifier,
                working_dir: config.working_dir,
                last_converted: Mutex::new(None),
            }),
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            retention: config.retention,
        }
    }

    /// Same as [`new`](Self::new) with a notifier that discards everything.
    pub fn silent(runtime: Arc<NativeRuntime>, stages: JobStages, config: OrchestratorConfig) -> Self {
        Self::new(runtime, stages, Arc::new(NullJobNotifier), config)
    }

    /// Accepts `reference` and starts processing it in the background.
    ///
    /// Fails with `JobAlreadyRunning` while another job is running; the
    /// running job is left untouched. A finished job still held for replay is
    /// retired first, so work is only ever accepted into an idle slot.
    pub fn submit(&self, reference: ResourceReference) -> Result<JobId, OrchestratorError> {
        if !self.runtime.is_ready() {
            return Err(OrchestratorError::NotInitialized);
        }

        let mut slot = self.lock_slot();
        self.expire(&mut slot);
        match slot.as_ref().map(|current| current.snapshot()) {
            Some(snapshot) if snapshot.state.is_running() => {
                log::warn!("Rejected {reference}: {} is still running", snapshot.job_id);
                return Err(OrchestratorError::JobAlreadyRunning {
                    active: snapshot.job_id,
                });
            }
            Some(snapshot) => {
                log::debug!("Retired {} ({})", snapshot.job_id, snapshot.state);
                *slot = None;
            }
            None => {}
        }

        let job_id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let relay = Arc::new(ProgressRelay::new(job_id, reference.to_string()));
        *slot = Some(relay.clone());
        drop(slot);

        log::info!("Submitted {job_id} for {reference}");
        let worker = self.worker.clone();
        thread::spawn(move || worker.run(relay, reference));

        Ok(job_id)
    }

    /// Attaches an observer to `job_id`. The first event is the job's
    /// current state, or its outcome if it already finished.
    pub fn subscribe(&self, job_id: JobId) -> Result<Subscription, OrchestratorError> {
        Ok(self.relay_for(job_id)?.subscribe())
    }

    /// Requests cancellation. Returns `false` for unknown jobs and for jobs
    /// that already finished.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let Ok(relay) = self.relay_for(job_id) else {
            return false;
        };
        let accepted = relay.request_cancel();
        if accepted {
            log::info!("{job_id}: cancellation requested");
        }
        accepted
    }

    /// Blocks until `job_id` finishes and returns its outcome.
    pub fn wait(&self, job_id: JobId) -> Result<Outcome, OrchestratorError> {
        self.subscribe(job_id)?
            .wait_outcome()
            .ok_or(OrchestratorError::UnknownJob(job_id))
    }

    /// The job currently held, running or finished. `None` when idle.
    pub fn snapshot(&self) -> Option<JobSnapshot> {
        let mut slot = self.lock_slot();
        self.expire(&mut slot);
        slot.as_ref().map(|relay| relay.snapshot())
    }

    pub fn state(&self) -> JobState {
        self.snapshot()
            .map(|snapshot| snapshot.state)
            .unwrap_or(JobState::Idle)
    }

    /// Retires a finished job, returning the orchestrator to `Idle`.
    /// Returns `false` if `job_id` is not held or is still running.
    pub fn clear(&self, job_id: JobId) -> bool {
        let mut slot = self.lock_slot();
        self.expire(&mut slot);
        let finished = slot
            .as_ref()
            .is_some_and(|relay| relay.job_id() == job_id && relay.snapshot().state.is_terminal());
        if finished {
            *slot = None;
            log::debug!("Cleared {job_id}");
        }
        finished
    }

    fn relay_for(&self, job_id: JobId) -> Result<Arc<ProgressRelay>, OrchestratorError> {
        let mut slot = self.lock_slot();
        self.expire(&mut slot);
        match slot.as_ref() {
            Some(relay) if relay.job_id() == job_id => Ok(relay.clone()),
            _ => Err(OrchestratorError::UnknownJob(job_id)),
        }
    }

    fn expire(&self, slot: &mut Option<Arc<ProgressRelay>>) {
        let expired = slot.as_ref().is_some_and(|relay| {
            relay
                .snapshot()
                .finished_at
                .is_some_and(|at| at.elapsed() >= self.retention)
        });
        if expired {
            if let Some(relay) = slot.take() {
                log::debug!("Retention elapsed for {}", relay.job_id());
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<ProgressRelay>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the stages and executes jobs on the background thread.
struct JobWorker {
    stages: JobStages,
    notifier: Arc<dyn JobNotifier>,
    working_dir: PathBuf,
    last_converted: Mutex<Option<PathBuf>>,
}

impl JobWorker {
    fn run(&self, relay: Arc<ProgressRelay>, reference: ResourceReference) {
        let _guard = FinishOnUnwind { relay: &relay };
        let job_id = relay.job_id();
        self.notifier.state_changed(job_id, JobState::Resolving);

        let outcome = match self.execute(&relay, &reference) {
            Ok(text) => Outcome::Success(text),
            Err(kind) => Outcome::Failure(kind),
        };

        let reached = relay.snapshot().percentage;
        let outcome = relay.finish(outcome);
        if outcome.is_success() && reached < 100 {
            self.notifier.progress(job_id, 100);
        }
        self.notifier.finished(job_id, &outcome);
    }

    fn execute(&self, relay: &Arc<ProgressRelay>, reference: &ResourceReference) -> Result<String, ErrorKind> {
        let job_id = relay.job_id();

        let resolved = panic::catch_unwind(AssertUnwindSafe(|| {
            self.stages.resolver.resolve(reference)
        }));
        let input = match resolved {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                log::warn!("{job_id}: cannot resolve {reference}: {e}");
                return Err(ErrorKind::UnresolvableReference);
            }
            Err(_) => {
                log::error!("{job_id}: resolution stage panicked");
                return Err(ErrorKind::UnresolvableReference);
            }
        };
        log::debug!("{job_id}: resolved to {}", input.display());

        self.enter(relay, JobState::Converting)?;
        if !input.is_file() {
            log::warn!("{job_id}: resolved file {} is gone", input.display());
            return Err(ErrorKind::UnresolvableReference);
        }
        let output = self.converted_path(&input).map_err(|e| {
            log::error!("{job_id}: cannot prepare {}: {e}", self.working_dir.display());
            ErrorKind::ConversionFailed
        })?;

        let converted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.stages.converter.convert(&input, &output)
        }));
        match converted {
            Ok(CONVERSION_OK) => {}
            Ok(code) => {
                log::warn!("{job_id}: conversion exited with {code}");
                return Err(ErrorKind::ConversionFailed);
            }
            Err(_) => {
                log::error!("{job_id}: conversion stage panicked");
                return Err(ErrorKind::ConversionFailed);
            }
        }

        self.enter(relay, JobState::Inferring)?;
        let sink = self.progress_sink(relay);
        let transcribed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.stages
                .recognizer
                .transcribe(&self.stages.assets, &output, sink)
        }));
        match transcribed {
            Ok(Ok(raw)) => Ok(strip_annotations(&raw)),
            Ok(Err(e)) => {
                log::warn!("{job_id}: inference failed: {e}");
                Err(ErrorKind::InferenceFailed)
            }
            Err(_) => {
                log::error!("{job_id}: inference stage panicked");
                Err(ErrorKind::InferenceFailed)
            }
        }
    }

    /// Moves the job to `state`, or stops it if cancellation was requested.
    fn enter(&self, relay: &ProgressRelay, state: JobState) -> Result<(), ErrorKind> {
        if !relay.advance(state) {
            return Err(ErrorKind::Cancelled);
        }
        self.notifier.state_changed(relay.job_id(), state);
        Ok(())
    }

    fn progress_sink(&self, relay: &Arc<ProgressRelay>) -> ProgressSink {
        let relay = relay.clone();
        let notifier = self.notifier.clone();
        Arc::new(move |raw: i32| {
            if let Some(percentage) = relay.publish_progress(raw) {
                notifier.progress(relay.job_id(), percentage);
            }
        })
    }

    /// `<working_dir>/<input stem>.wav`, removing the previous job's file so
    /// only one converted file exists at a time.
    fn converted_path(&self, input: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.working_dir)?;

        let stem = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("audio"));
        let mut name = stem.clone();
        name.push(".");
        name.push(CONVERTED_EXTENSION);
        let mut output = self.working_dir.join(name);
        if output == input {
            let mut name = stem;
            name.push("-16k.");
            name.push(CONVERTED_EXTENSION);
            output = self.working_dir.join(name);
        }

        let mut last = self.last_converted.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = last.take() {
            if previous != output && previous.exists() {
                if let Err(e) = fs::remove_file(&previous) {
                    log::warn!("Failed to remove {}: {e}", previous.display());
                }
            }
        }
        *last = Some(output.clone());
        Ok(output)
    }
}

/// Finishes the job with the failure kind of its current stage if the
/// worker unwinds before recording an outcome.
struct FinishOnUnwind<'a> {
    relay: &'a ProgressRelay,
}

impl Drop for FinishOnUnwind<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let snapshot = self.relay.snapshot();
        if snapshot.outcome.is_some() {
            return;
        }
        log::error!("{}: worker panicked while {}", snapshot.job_id, snapshot.state);
        self.relay.finish(Outcome::Failure(failure_for(snapshot.state)));
    }
}

fn failure_for(state: JobState) -> ErrorKind {
    match state {
        JobState::Idle | JobState::Resolving => ErrorKind::UnresolvableReference,
        JobState::Converting => ErrorKind::ConversionFailed,
        JobState::Inferring | JobState::Succeeded | JobState::Failed => ErrorKind::InferenceFailed,
    }
}
