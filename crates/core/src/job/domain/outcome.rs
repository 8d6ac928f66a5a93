use thiserror::Error;

/// Failure kinds a job or a submission can end with.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("the resource reference could not be resolved to a local file")]
    UnresolvableReference,
    #[error("audio conversion failed")]
    ConversionFailed,
    #[error("speech recognition failed")]
    InferenceFailed,
    #[error("the job was cancelled")]
    Cancelled,
    #[error("another job is already running")]
    JobAlreadyRunning,
}

/// Terminal result of a job. Set exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(ErrorKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Success(text) => Some(text),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(kind) => Some(*kind),
        }
    }
}
