use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unit of work handed to an executor: everything the orchestrator needs to
/// drive one job from pending to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub job_id: Uuid,
    pub source_dir: PathBuf,
    pub project_name: String,
}
