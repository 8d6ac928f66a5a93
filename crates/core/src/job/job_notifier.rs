use std::sync::Mutex;
use std::time::Instant;

use crate::job::domain::job_state::{JobId, JobState};
use crate::job::domain::outcome::Outcome;

/// Cross-cutting observer for job lifecycle events.
///
/// Decouples the orchestrator from how a host surfaces background work
/// (log lines, a status bar, a system notification). Called from the job's
/// worker thread, after the event has been recorded in the relay.
pub trait JobNotifier: Send + Sync {
    fn state_changed(&self, job_id: JobId, state: JobState);

    /// A newly published percentage.
    fn progress(&self, job_id: JobId, percentage: u8);

    fn finished(&self, job_id: JobId, outcome: &Outcome);
}

/// Silent notifier that discards all events.
///
/// Used by hosts that read progress from subscriptions only, and by tests.
pub struct NullJobNotifier;

impl JobNotifier for NullJobNotifier {
    fn state_changed(&self, _job_id: JobId, _state: JobState) {}
    fn progress(&self, _job_id: JobId, _percentage: u8) {}
    fn finished(&self, _job_id: JobId, _outcome: &Outcome) {}
}

struct LogState {
    started: Option<Instant>,
    last_logged: Option<u8>,
}

/// Notifier that writes job events through the `log` crate.
///
/// Progress lines are throttled to one per `step_percent` points so a long
/// transcription does not flood the log.
pub struct LogJobNotifier {
    step_percent: u8,
    state: Mutex<LogState>,
}

impl LogJobNotifier {
    pub fn new(step_percent: u8) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            state: Mutex::new(LogState {
                started: None,
                last_logged: None,
            }),
        }
    }

    /// Whether a progress line for `percentage` would be written.
    fn should_log(&self, percentage: u8) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let due = match state.last_logged {
            None => true,
            Some(last) => percentage == 100 || percentage >= last.saturating_add(self.step_percent),
        };
        if due {
            state.last_logged = Some(percentage);
        }
        due
    }
}

impl Default for LogJobNotifier {
    fn default() -> Self {
        Self::new(10)
    }
}

impl JobNotifier for LogJobNotifier {
    fn state_changed(&self, job_id: JobId, state: JobState) {
        if state == JobState::Resolving {
            let mut log_state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            log_state.started = Some(Instant::now());
            log_state.last_logged = None;
        }
        log::info!("{job_id}: {state}");
    }

    fn progress(&self, job_id: JobId, percentage: u8) {
        if self.should_log(percentage) {
            log::info!("{job_id}: transcribing ({percentage}%)");
        }
    }

    fn finished(&self, job_id: JobId, outcome: &Outcome) {
        let elapsed = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        match outcome {
            Outcome::Success(text) => log::info!(
                "{job_id}: succeeded in {elapsed:.1}s ({} chars)",
                text.chars().count()
            ),
            Outcome::Failure(kind) => log::warn!("{job_id}: failed after {elapsed:.1}s: {kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::domain::outcome::ErrorKind;

    #[test]
    fn test_null_notifier_all_methods_are_noop() {
        let notifier = NullJobNotifier;
        notifier.state_changed(JobId::new(1), JobState::Resolving);
        notifier.progress(JobId::new(1), 50);
        notifier.finished(JobId::new(1), &Outcome::Failure(ErrorKind::Cancelled));
    }

    #[test]
    fn test_progress_throttled_to_step() {
        let notifier = LogJobNotifier::new(25);
        let logged: Vec<u8> = (1..=100).filter(|&p| notifier.should_log(p)).collect();
        assert_eq!(logged, vec![1, 26, 51, 76, 100]);
    }

    #[test]
    fn test_new_job_resets_throttle() {
        let notifier = LogJobNotifier::new(50);
        assert!(notifier.should_log(90));
        notifier.state_changed(JobId::new(2), JobState::Resolving);
        assert!(notifier.should_log(5));
    }

    #[test]
    fn test_default_step() {
        let notifier = LogJobNotifier::default();
        assert_eq!(notifier.step_percent, 10);
    }

    #[test]
    fn test_zero_step_is_clamped() {
        let notifier = LogJobNotifier::new(0);
        assert!(notifier.should_log(1));
        assert!(notifier.should_log(2));
    }
}
