use std::fmt;

/// Identifier of one submitted job, unique for the orchestrator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Position of a job in the processing state machine.
///
/// `Idle → Resolving → Converting → Inferring → Succeeded`, with `Failed`
/// reachable from any running state. `Idle` only describes an empty
/// orchestrator; a job never returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Idle,
    Resolving,
    Converting,
    Inferring,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobState::Resolving | JobState::Converting | JobState::Inferring
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobState::Idle => 0,
            JobState::Resolving => 1,
            JobState::Converting => 2,
            JobState::Inferring => 3,
            JobState::Succeeded | JobState::Failed => 4,
        }
    }

    /// Whether moving from `self` to `next` goes forward in the machine.
    pub fn can_advance_to(self, next: JobState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Resolving => "resolving",
            JobState::Converting => "converting",
            JobState::Inferring => "inferring",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}
