use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Status of a conversion job.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job in this status may move to `next`. Transitions only go
    /// forward; a pending job may fail without ever being picked up.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Coarse progress percentage reported to pollers.
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Pending => 10,
            JobStatus::Processing => 50,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }

    /// Statuses from which a job may enter `self`.
    pub fn allowed_predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[JobStatus::Pending],
            JobStatus::Completed => &[JobStatus::Processing],
            JobStatus::Failed => &[JobStatus::Pending, JobStatus::Processing],
        }
    }
}

/// A state change applied to a job record by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    Processing,
    Completed { output_file: String },
    Failed { error_message: String },
}

impl JobTransition {
    pub fn target(&self) -> JobStatus {
        match self {
            JobTransition::Processing => JobStatus::Processing,
            JobTransition::Completed { .. } => JobStatus::Completed,
            JobTransition::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// A TypeScript-to-shell conversion job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionJob {
    pub id: Uuid,
    pub project_name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub output_file: Option<String>,
}

impl ConversionJob {
    pub fn new(project_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_name: project_name.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
            output_file: None,
        }
    }

    /// Apply a transition in place. Returns `false` without touching the
    /// record if the current status does not permit it.
    pub fn apply(&mut self, transition: &JobTransition) -> bool {
        if !self.status.can_transition_to(transition.target()) {
            return false;
        }
        self.status = transition.target();
        self.updated_at = Utc::now();
        match transition {
            JobTransition::Processing => {}
            JobTransition::Completed { output_file } => {
                self.output_file = Some(output_file.clone());
                self.error_message = None;
            }
            JobTransition::Failed { error_message } => {
                self.error_message = Some(error_message.clone());
                self.output_file = None;
            }
        }
        true
    }
}

/// File name of the packaged artifact for a project.
pub fn artifact_file_name(project_name: &str) -> String {
    format!("{}.sh", project_name)
}
