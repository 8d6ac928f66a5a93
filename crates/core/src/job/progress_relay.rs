use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::job::domain::job_event::{JobEvent, JobSnapshot, ProgressEvent};
use crate::job::domain::job_state::{JobId, JobState};
use crate::job::domain::outcome::{ErrorKind, Outcome};

struct RelayInner {
    snapshot: JobSnapshot,
    cancel_requested: bool,
    subscribers: Vec<Sender<JobEvent>>,
}

/// Broadcasts one job's state, progress and outcome to any number of
/// observers.
///
/// All mutation goes through a single lock, so every observer sees events in
/// the order they were recorded. New observers first receive the current
/// value (state and percentage, or the outcome once finished), then live
/// events.
pub struct ProgressRelay {
    inner: Mutex<RelayInner>,
}

impl ProgressRelay {
    /// Relay for a freshly submitted job, starting in `Resolving` at 0%.
    pub fn new(job_id: JobId, reference: String) -> Self {
        Self {
            inner: Mutex::new(RelayInner {
                snapshot: JobSnapshot {
                    job_id,
                    reference,
                    state: JobState::Resolving,
                    percentage: 0,
                    outcome: None,
                    finished_at: None,
                },
                cancel_requested: false,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.lock().snapshot.job_id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut inner = self.lock();
        let replay = inner.snapshot.replay_event();
        let finished = replay.is_terminal();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(replay);
        if !finished {
            inner.subscribers.push(tx);
        }
        Subscription::new(rx)
    }

    /// Moves the job forward to `next`. Returns `false`, publishing nothing,
    /// if the move would go backwards or cancellation has been requested.
    pub fn advance(&self, next: JobState) -> bool {
        let mut inner = self.lock();
        if inner.cancel_requested || next.is_terminal() || !inner.snapshot.state.can_advance_to(next) {
            return false;
        }
        inner.snapshot.state = next;
        let event = JobEvent::State {
            job_id: inner.snapshot.job_id,
            state: next,
            percentage: inner.snapshot.percentage,
        };
        broadcast(&mut inner, event);
        true
    }

    /// Records a raw progress value from the inference stage.
    ///
    /// The value is clamped to `[0, 100]` and only published when it exceeds
    /// the last published percentage. Nothing is published outside
    /// `Inferring` or after cancellation was requested.
    pub fn publish_progress(&self, raw: i32) -> Option<u8> {
        let mut inner = self.lock();
        if inner.cancel_requested || inner.snapshot.state != JobState::Inferring {
            return None;
        }
        let percentage = raw.clamp(0, 100) as u8;
        if percentage <= inner.snapshot.percentage {
            return None;
        }
        inner.snapshot.percentage = percentage;
        let event = JobEvent::Progress(ProgressEvent {
            job_id: inner.snapshot.job_id,
            percentage,
        });
        broadcast(&mut inner, event);
        Some(percentage)
    }

    /// Records the terminal outcome and releases all observers.
    ///
    /// The first call wins; later calls return the stored outcome unchanged.
    /// A pending cancellation request replaces whatever `outcome` the stage
    /// produced with `Failure(Cancelled)`.
    pub fn finish(&self, outcome: Outcome) -> Outcome {
        let mut inner = self.lock();
        if let Some(existing) = &inner.snapshot.outcome {
            return existing.clone();
        }

        let outcome = if inner.cancel_requested {
            Outcome::Failure(ErrorKind::Cancelled)
        } else {
            outcome
        };

        if outcome.is_success() && inner.snapshot.percentage < 100 {
            inner.snapshot.percentage = 100;
            let event = JobEvent::Progress(ProgressEvent {
                job_id: inner.snapshot.job_id,
                percentage: 100,
            });
            broadcast(&mut inner, event);
        }

        inner.snapshot.state = if outcome.is_success() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        inner.snapshot.outcome = Some(outcome.clone());
        inner.snapshot.finished_at = Some(Instant::now());

        let event = JobEvent::Finished {
            job_id: inner.snapshot.job_id,
            outcome: outcome.clone(),
        };
        broadcast(&mut inner, event);
        inner.subscribers.clear();
        outcome
    }

    /// Asks the job to stop. Returns `false` if it had already finished.
    pub fn request_cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.snapshot.outcome.is_some() {
            return false;
        }
        inner.cancel_requested = true;
        true
    }

    fn lock(&self) -> MutexGuard<'_, RelayInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn broadcast(inner: &mut RelayInner, event: JobEvent) {
    inner
        .subscribers
        .retain(|tx| tx.send(event.clone()).is_ok());
}

/// An observer's view of one job: a blocking sequence of events that ends
/// after the terminal `Finished` event.
///
/// Dropping a subscription detaches the observer without affecting the job.
pub struct Subscription {
    rx: Receiver<JobEvent>,
    finished: bool,
}

impl Subscription {
    fn new(rx: Receiver<JobEvent>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Blocks until the job finishes and returns its outcome.
    pub fn wait_outcome(self) -> Option<Outcome> {
        self.into_iter().find_map(|event| match event {
            JobEvent::Finished { outcome, .. } => Some(outcome),
            _ => None,
        })
    }

    fn observe(&mut self, event: JobEvent) -> JobEvent {
        if event.is_terminal() {
            self.finished = true;
        }
        event
    }
}

impl Iterator for Subscription {
    type Item = JobEvent;

    fn next(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        match self.rx.recv() {
            Ok(event) => Some(self.observe(event)),
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn relay() -> ProgressRelay {
        ProgressRelay::new(JobId::new(1), "/sdcard/a.mp3".to_string())
    }

    fn inferring_relay() -> ProgressRelay {
        let relay = relay();
        assert!(relay.advance(JobState::Converting));
        assert!(relay.advance(JobState::Inferring));
        relay
    }

    fn percentages(events: &[JobEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(p.percentage),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_subscribe_replays_current_state() {
        let relay = inferring_relay();
        relay.publish_progress(30);
        let sub = relay.subscribe();
        assert_eq!(
            sub.rx.try_recv().ok(),
            Some(JobEvent::State {
                job_id: JobId::new(1),
                state: JobState::Inferring,
                percentage: 30,
            })
        );
        assert!(sub.rx.try_recv().is_err());
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let relay = inferring_relay();
        let sub = relay.subscribe();
        for raw in [10, 5, 40, 40, -3, 250, 90] {
            relay.publish_progress(raw);
        }
        relay.finish(Outcome::Success("ok".to_string()));

        let events: Vec<JobEvent> = sub.collect();
        assert_eq!(percentages(&events), vec![10, 40, 100]);
    }

    #[test]
    fn test_progress_ignored_outside_inferring() {
        let relay = relay();
        assert_eq!(relay.publish_progress(50), None);
        assert_eq!(relay.snapshot().percentage, 0);
    }

    #[test]
    fn test_advance_rejects_backwards_moves() {
        let relay = inferring_relay();
        assert!(!relay.advance(JobState::Converting));
        assert!(!relay.advance(JobState::Succeeded));
        assert_eq!(relay.snapshot().state, JobState::Inferring);
    }

    #[test]
    fn test_finish_is_exactly_once() {
        let relay = inferring_relay();
        let first = relay.finish(Outcome::Failure(ErrorKind::InferenceFailed));
        let second = relay.finish(Outcome::Success("late".to_string()));
        assert_eq!(first, Outcome::Failure(ErrorKind::InferenceFailed));
        assert_eq!(second, first);
        assert_eq!(relay.snapshot().state, JobState::Failed);
        assert!(relay.snapshot().finished_at.is_some());
    }

    #[test]
    fn test_success_publishes_final_hundred() {
        let relay = inferring_relay();
        let sub = relay.subscribe();
        relay.publish_progress(60);
        relay.finish(Outcome::Success("done".to_string()));
        let events: Vec<JobEvent> = sub.collect();
        assert_eq!(percentages(&events), vec![60, 100]);
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn test_failure_does_not_publish_hundred() {
        let relay = inferring_relay();
        let sub = relay.subscribe();
        relay.publish_progress(60);
        relay.finish(Outcome::Failure(ErrorKind::InferenceFailed));
        let events: Vec<JobEvent> = sub.collect();
        assert_eq!(percentages(&events), vec![60]);
    }

    #[test]
    fn test_late_subscriber_gets_outcome_only() {
        let relay = inferring_relay();
        relay.finish(Outcome::Success("hello".to_string()));

        for _ in 0..2 {
            let events: Vec<JobEvent> = relay.subscribe().collect();
            assert_eq!(
                events,
                vec![JobEvent::Finished {
                    job_id: JobId::new(1),
                    outcome: Outcome::Success("hello".to_string()),
                }]
            );
        }
    }

    #[test]
    fn test_cancel_suppresses_progress_and_overrides_outcome() {
        let relay = inferring_relay();
        let sub = relay.subscribe();
        relay.publish_progress(20);
        assert!(relay.request_cancel());
        assert_eq!(relay.publish_progress(80), None);
        assert!(!relay.advance(JobState::Succeeded));
        let outcome = relay.finish(Outcome::Success("too late".to_string()));

        assert_eq!(outcome, Outcome::Failure(ErrorKind::Cancelled));
        let events: Vec<JobEvent> = sub.collect();
        assert_eq!(percentages(&events), vec![20]);
    }

    #[test]
    fn test_cancel_after_finish_is_ignored() {
        let relay = inferring_relay();
        relay.finish(Outcome::Success("done".to_string()));
        assert!(!relay.request_cancel());
        assert!(relay.snapshot().outcome.unwrap().is_success());
        assert_eq!(relay.snapshot().state, JobState::Succeeded);
    }

    #[test]
    fn test_dropped_subscriber_does_not_block_relay() {
        let relay = inferring_relay();
        drop(relay.subscribe());
        assert_eq!(relay.publish_progress(10), Some(10));
        relay.finish(Outcome::Success("ok".to_string()));
    }

    #[test]
    fn test_subscription_ends_after_finished_event() {
        let relay = inferring_relay();
        let mut sub = relay.subscribe();
        assert!(sub.next().is_some());
        relay.finish(Outcome::Failure(ErrorKind::InferenceFailed));
        assert!(sub.next().unwrap().is_terminal());
        assert_eq!(sub.next(), None);
    }

    #[test]
    fn test_concurrent_progress_stays_monotonic() {
        let relay = Arc::new(inferring_relay());
        let sub = relay.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let relay = relay.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        relay.publish_progress((i * 7 + t * 13) % 101);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        relay.finish(Outcome::Success("ok".to_string()));

        let seen = percentages(&sub.collect::<Vec<_>>());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
        assert!(seen.iter().all(|&p| p <= 100));
        assert_eq!(seen.last(), Some(&100));
    }
}
