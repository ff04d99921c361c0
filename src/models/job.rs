use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a face-swap job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// `completed` and `error` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending | JobStatus::Processing, JobStatus::Completed | JobStatus::Error) => {
                true
            }
            _ => false,
        }
    }
}

/// Where a job currently is, carrying the data that only exists in that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed { result_url: String },
    Error { message: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Error { .. } => JobStatus::Error,
        }
    }

    /// Rebuild a state from its flattened columns. Returns `None` when the
    /// columns contradict each other (e.g. `completed` without a URL).
    pub fn from_parts(
        status: JobStatus,
        result_url: Option<String>,
        error_message: Option<String>,
    ) -> Option<Self> {
        match (status, result_url, error_message) {
            (JobStatus::Pending, None, None) => Some(JobState::Pending),
            (JobStatus::Processing, None, None) => Some(JobState::Processing),
            (JobStatus::Completed, Some(result_url), None) => {
                Some(JobState::Completed { result_url })
            }
            (JobStatus::Error, None, Some(message)) => Some(JobState::Error { message }),
            _ => None,
        }
    }
}

/// One face-swap generation request, tracked from submission to outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new_pending(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn result_url(&self) -> Option<&str> {
        match &self.state {
            JobState::Completed { result_url } => Some(result_url),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Move to `next`, refusing anything that is not a forward transition.
    pub fn transition(&mut self, next: JobState) -> Result<(), (JobStatus, JobStatus)> {
        let from = self.status();
        let to = next.status();
        if !from.can_transition_to(to) {
            return Err((from, to));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Flat JSON view of a job returned to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status(),
            result_url: job.result_url().map(str::to_string),
            error_message: job.error_message().map(str::to_string),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
