use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ConversionJob, JobStatus};

/// Metadata portion of a conversion upload.
#[derive(Debug, Deserialize, Validate)]
pub struct ConversionRequest {
    #[garde(length(min = 1, max = 128), custom(valid_project_name))]
    pub project_name: String,
}

/// Project names become file names, so anything that could escape the job's
/// output directory or be read as an option is rejected.
fn valid_project_name(value: &String, _ctx: &()) -> garde::Result {
    if value == "." || value == ".." {
        return Err(garde::Error::new("must not be a relative directory name"));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(garde::Error::new("must not contain path separators"));
    }
    if value.chars().any(char::is_control) {
        return Err(garde::Error::new("must not contain control characters"));
    }
    if value.starts_with('-') {
        return Err(garde::Error::new("must not start with '-'"));
    }
    Ok(())
}

/// Response after submitting a project for conversion.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversionStatus {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&ConversionJob> for ConversionStatus {
    fn from(job: &ConversionJob) -> Self {
        let download_url = match (job.status, &job.output_file) {
            (JobStatus::Completed, Some(_)) => Some(format!("/api/download/{}", job.id)),
            _ => None,
        };
        let error_message = match job.status {
            JobStatus::Failed => job.error_message.clone(),
            _ => None,
        };

        Self {
            job_id: job.id,
            status: job.status,
            progress: job.status.progress(),
            message: format!("Job is {}", job.status),
            download_url,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobTransition;

    fn request(name: &str) -> ConversionRequest {
        ConversionRequest {
            project_name: name.to_string(),
        }
    }

    #[test]
    fn test_project_name_validation() {
        assert!(request("demo").validate().is_ok());
        assert!(request("my app v2").validate().is_ok());
        assert!(request("").validate().is_err());
        assert!(request("..").validate().is_err());
        assert!(request("../etc/passwd").validate().is_err());
        assert!(request("a\\b").validate().is_err());
        assert!(request("-rf").validate().is_err());
        assert!(request("two\nlines").validate().is_err());
        assert!(request(&"x".repeat(129)).validate().is_err());
    }

    #[test]
    fn test_status_view_for_pending_job() {
        let job = ConversionJob::new("demo");
        let status = ConversionStatus::from(&job);
        assert_eq!(status.progress, 10);
        assert_eq!(status.message, "Job is pending");
        assert!(status.download_url.is_none());
        assert!(status.error_message.is_none());
    }

    #[test]
    fn test_status_view_for_completed_job() {
        let mut job = ConversionJob::new("demo");
        job.apply(&JobTransition::Processing);
        job.apply(&JobTransition::Completed {
            output_file: "demo.sh".to_string(),
        });
        let status = ConversionStatus::from(&job);
        assert_eq!(status.progress, 100);
        assert_eq!(
            status.download_url,
            Some(format!("/api/download/{}", job.id))
        );
        assert!(status.error_message.is_none());
    }

    #[test]
    fn test_status_view_for_failed_job() {
        let mut job = ConversionJob::new("demo");
        job.apply(&JobTransition::Processing);
        job.apply(&JobTransition::Failed {
            error_message: "boom".to_string(),
        });
        let status = ConversionStatus::from(&job);
        assert_eq!(status.progress, 0);
        assert!(status.download_url.is_none());
        assert_eq!(status.error_message.as_deref(), Some("boom"));
    }
}
