// Job Domain Model

use super::error::{DomainError, Result};
use super::result::ToolResult;
use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (opaque, assigned by the backend)
pub type JobId = String;

/// Job Status
///
/// Lifecycle: `Pending -> Running -> {Done | Error | Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
    Aborted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Error,
        JobStatus::Aborted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Aborted)
    }

    /// Only running jobs can be cancelled by the backend
    pub fn is_cancellable(&self) -> bool {
        *self == JobStatus::Running
    }

    /// Only failed or aborted jobs can be retried by the backend
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Error | JobStatus::Aborted)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Processing tool a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobTool {
    /// Stem separation
    Noxsongizer,
    /// Image-to-video "depixelization"
    Noxelizer,
    /// YouTube media extraction
    Noxtubizer,
    /// Audio analysis (BPM, key, duration)
    Noxtunizer,
}

impl JobTool {
    pub const ALL: [JobTool; 4] = [
        JobTool::Noxsongizer,
        JobTool::Noxelizer,
        JobTool::Noxtubizer,
        JobTool::Noxtunizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobTool::Noxsongizer => "noxsongizer",
            JobTool::Noxelizer => "noxelizer",
            JobTool::Noxtubizer => "noxtubizer",
            JobTool::Noxtunizer => "noxtunizer",
        }
    }

    /// URL-based tools have no uploaded source file
    pub fn has_uploaded_input(&self) -> bool {
        !matches!(self, JobTool::Noxtubizer)
    }
}

impl std::fmt::Display for JobTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobTool {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobTool::ALL
            .into_iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::UnknownTool(s.to_string()))
    }
}

/// Job Entity (wire shape of the backend's job representation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    // Identity
    pub id: JobId,
    pub tool: JobTool,
    pub status: JobStatus,

    // Provenance (None for URL-based tools)
    #[serde(default)]
    pub input_filename: Option<String>,
    #[serde(default)]
    pub input_path: Option<String>,

    // Output
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_files: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: serde_json::Value,

    // Failure
    #[serde(default)]
    pub error_message: Option<String>,

    // Timing
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,

    // Retry bookkeeping
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    1
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Job {
    /// Create a pending job with empty output
    ///
    /// # Arguments
    ///
    /// * `id` - Job ID (assigned by the backend)
    /// * `tool` - Tool that processes the job
    /// * `created_at` - Creation timestamp
    pub fn new(id: impl Into<String>, tool: JobTool, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            tool,
            status: JobStatus::Pending,
            input_filename: None,
            input_path: None,
            output_path: None,
            output_files: Vec::new(),
            params: serde_json::Value::Null,
            result: serde_json::Value::Null,
            error_message: None,
            created_at,
            updated_at: None,
            started_at: None,
            completed_at: None,
            attempt: 0,
            max_attempts: default_max_attempts(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn belongs_to(&self, tool: Option<JobTool>) -> bool {
        tool.map_or(true, |t| t == self.tool)
    }

    /// Resolve the tool-specific result payload
    pub fn typed_result(&self) -> Result<ToolResult> {
        ToolResult::from_value(self.tool, &self.result)
    }

    /// Check the timestamp invariants for the current status
    ///
    /// `completed_at` is set iff the status is terminal, `started_at` once
    /// the job has left `pending`. Used for diagnostics; cached jobs are never
    /// rejected because of it.
    pub fn check_timestamps(&self) -> Result<()> {
        if self.status.is_terminal() != self.completed_at.is_some() {
            return Err(DomainError::Validation(format!(
                "job {} is {} but completed_at is {}",
                self.id,
                self.status,
                if self.completed_at.is_some() { "set" } else { "missing" }
            )));
        }
        if self.status == JobStatus::Running && self.started_at.is_none() {
            return Err(DomainError::Validation(format!(
                "job {} is running without started_at",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_backend_job() {
        let job: Job = serde_json::from_value(json!({
            "id": "a",
            "tool": "noxsongizer",
            "status": "done",
            "input_filename": "song.mp3",
            "output_files": ["vocals.wav", "drums.wav"],
            "params": {},
            "result": {"stems": ["vocals.wav", "drums.wav"]},
            "error_message": null,
            "created_at": "2024-01-02T00:00:00Z",
            "updated_at": "2024-01-02T00:01:00Z",
            "started_at": "2024-01-02T00:00:10Z",
            "completed_at": "2024-01-02T00:01:00Z",
            "locked_at": null,
            "locked_by": null,
            "attempt": 1,
            "max_attempts": 1
        }))
        .unwrap();

        assert_eq!(job.id, "a");
        assert_eq!(job.tool, JobTool::Noxsongizer);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.output_files.len(), 2);
        assert!(job.check_timestamps().is_ok());
    }

    #[test]
    fn test_deserialize_minimal_job() {
        let job: Job = serde_json::from_value(json!({
            "id": "b",
            "tool": "noxtubizer",
            "status": "pending",
            "created_at": "2024-01-02T00:00:00",
            "output_files": null
        }))
        .unwrap();

        assert!(job.output_files.is_empty());
        assert!(job.result.is_null());
        assert_eq!(job.max_attempts, 1);
        assert!(!job.tool.has_uploaded_input());
    }

    #[test]
    fn test_status_and_tool_parsing() {
        assert_eq!("RUNNING".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!("noxtunizer".parse::<JobTool>().unwrap(), JobTool::Noxtunizer);
        assert!("queued".parse::<JobStatus>().is_err());
        assert!("noxify".parse::<JobTool>().is_err());
    }

    #[test]
    fn test_status_capabilities() {
        assert!(JobStatus::Running.is_cancellable());
        assert!(!JobStatus::Pending.is_cancellable());
        assert!(JobStatus::Aborted.is_retryable());
        assert!(!JobStatus::Done.is_retryable());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_check_timestamps_flags_missing_completion() {
        let mut job = Job::new("c", JobTool::Noxelizer, Timestamp::from_millis(0).unwrap());
        assert!(job.check_timestamps().is_ok());

        job.status = JobStatus::Done;
        assert!(job.check_timestamps().is_err());

        job.completed_at = Timestamp::from_millis(1_000);
        assert!(job.check_timestamps().is_ok());
    }

    #[test]
    fn test_belongs_to() {
        let job = Job::new("d", JobTool::Noxelizer, Timestamp::from_millis(0).unwrap());
        assert!(job.belongs_to(None));
        assert!(job.belongs_to(Some(JobTool::Noxelizer)));
        assert!(!job.belongs_to(Some(JobTool::Noxsongizer)));
    }
}
