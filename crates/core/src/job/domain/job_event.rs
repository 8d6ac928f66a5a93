use std::time::Instant;

use super::job_state::{JobId, JobState};
use super::outcome::Outcome;

/// A percentage update for one job, always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub percentage: u8,
}

/// What an observer receives about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The job entered `state`; also the replayed value on attach.
    State {
        job_id: JobId,
        state: JobState,
        percentage: u8,
    },
    Progress(ProgressEvent),
    /// Terminal; no events follow.
    Finished { job_id: JobId, outcome: Outcome },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Finished { .. })
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub reference: String,
    pub state: JobState,
    pub percentage: u8,
    pub outcome: Option<Outcome>,
    pub finished_at: Option<Instant>,
}

impl JobSnapshot {
    pub fn replay_event(&self) -> JobEvent {
        match &self.outcome {
            Some(outcome) => JobEvent::Finished {
                job_id: self.job_id,
                outcome: outcome.clone(),
            },
            None => JobEvent::State {
                job_id: self.job_id,
                state: self.state,
                percentage: self.percentage,
            },
        }
    }
}
