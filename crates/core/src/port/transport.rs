// Job Transport Port (Interface)
// Request/response calls against the jobs API plus the push event stream

use crate::application::constants::BACKEND_UNREACHABLE;
use crate::application::shutdown::ShutdownSender;
use crate::domain::{Job, JobId, JobStatus, JobTool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Non-2xx response; `message` is the server text or a generic fallback
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Message suitable for a user-facing notice
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Status { message, .. } => message.clone(),
            TransportError::Connection(_) | TransportError::Decode(_) => {
                BACKEND_UNREACHABLE.to_string()
            }
            TransportError::InvalidUrl(_) => self.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Query parameters for `GET /jobs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListJobsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<JobTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Response envelope for paginated job listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedJobs {
    pub items: Vec<Job>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Parsed push event
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Created(Job),
    Updated(Job),
    Deleted(JobId),
}

/// Receiver of push events
///
/// `on_error` is a signal, not a terminal state: the stream may keep
/// delivering events afterwards.
pub trait JobEventHandler: Send + Sync {
    fn on_created(&self, job: Job);

    fn on_updated(&self, job: Job);

    fn on_deleted(&self, job_id: JobId);

    fn on_error(&self);

    fn dispatch(&self, event: JobEvent) {
        match event {
            JobEvent::Created(job) => self.on_created(job),
            JobEvent::Updated(job) => self.on_updated(job),
            JobEvent::Deleted(job_id) => self.on_deleted(job_id),
        }
    }
}

/// Handle to an open push stream
///
/// Closing (explicitly or by dropping the handle) stops the connection.
pub struct StreamHandle {
    shutdown: ShutdownSender,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(shutdown: ShutdownSender) -> Self {
        Self {
            shutdown,
            task: None,
        }
    }

    /// Handle that also owns the task driving the connection
    pub fn with_task(shutdown: ShutdownSender, task: JoinHandle<()>) -> Self {
        Self {
            shutdown,
            task: Some(task),
        }
    }

    pub fn close(&self) {
        self.shutdown.shutdown();
    }

    /// True once closed, or once the driving task has ended on its own
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_shutdown() || self.task.as_ref().is_some_and(|t| t.is_finished())
    }

    /// Close and wait for the driving task to finish
    pub async fn join(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

/// Transport interface for the jobs API
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// List jobs with optional tool/status filters and pagination
    async fn list_jobs(&self, params: &ListJobsParams) -> Result<PaginatedJobs, TransportError>;

    /// Fetch one job by ID
    async fn get_job(&self, job_id: &str) -> Result<Job, TransportError>;

    /// Delete a job (does not touch any client cache)
    async fn delete_job(&self, job_id: &str) -> Result<(), TransportError>;

    /// Cancel a running job, returning the updated job
    async fn cancel_job(&self, job_id: &str) -> Result<Job, TransportError>;

    /// Retry a failed or aborted job, returning the updated job
    async fn retry_job(&self, job_id: &str) -> Result<Job, TransportError>;

    /// Open the push stream; failures are reported via `handler.on_error()`
    fn open_stream(&self, handler: std::sync::Arc<dyn JobEventHandler>) -> StreamHandle;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::application::shutdown::{shutdown_channel, ShutdownToken};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    /// In-memory jobs API
    ///
    /// Holds a backing list of jobs that `list_jobs` filters and pages.
    /// List calls can be held at a gate to simulate a slow response, and
    /// the push stream is driven by the test through `emit`/`emit_error`.
    /// Inside a tokio runtime each stream gets a task that `end_stream`
    /// finishes, like a connection that ran out of reconnect attempts.
    pub struct MockJobTransport {
        jobs: Mutex<Vec<Job>>,
        list_failures: Mutex<Vec<TransportError>>,
        delete_failure: Mutex<Option<TransportError>>,
        gate: watch::Sender<bool>,
        stream_end: watch::Sender<bool>,
        handler: Mutex<Option<Arc<dyn JobEventHandler>>>,
        stream_tokens: Mutex<Vec<ShutdownToken>>,
        list_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        stream_opens: AtomicUsize,
    }

    impl MockJobTransport {
        pub fn new() -> Self {
            Self::with_jobs(Vec::new())
        }

        pub fn with_jobs(jobs: Vec<Job>) -> Self {
            let (gate, _) = watch::channel(true);
            let (stream_end, _) = watch::channel(false);
            Self {
                jobs: Mutex::new(jobs),
                list_failures: Mutex::new(Vec::new()),
                delete_failure: Mutex::new(None),
                gate,
                stream_end,
                handler: Mutex::new(None),
                stream_tokens: Mutex::new(Vec::new()),
                list_calls: AtomicUsize::new(0),
                delete_calls: AtomicUsize::new(0),
                stream_opens: AtomicUsize::new(0),
            }
        }

        /// Replace the backend's job list
        pub fn set_jobs(&self, jobs: Vec<Job>) {
            *self.jobs.lock().unwrap() = jobs;
        }

        /// Make the next `list_jobs` call fail
        pub fn fail_next_list(&self, error: TransportError) {
            self.list_failures.lock().unwrap().push(error);
        }

        /// Make every `delete_job` call fail until cleared
        pub fn fail_deletes(&self, error: Option<TransportError>) {
            *self.delete_failure.lock().unwrap() = error;
        }

        /// Block `list_jobs` responses until `release_lists`
        pub fn hold_lists(&self) {
            self.gate.send_replace(false);
        }

        pub fn release_lists(&self) {
            self.gate.send_replace(true);
        }

        /// Deliver a push event to the open stream (if any)
        pub fn emit(&self, event: JobEvent) {
            if let Some(handler) = self.current_handler() {
                handler.dispatch(event);
            }
        }

        /// Report a stream failure to the open stream (if any)
        pub fn emit_error(&self) {
            if let Some(handler) = self.current_handler() {
                handler.on_error();
            }
        }

        /// Report a final error and let the stream task finish
        pub fn end_stream(&self) {
            self.emit_error();
            self.stream_end.send_replace(true);
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        pub fn stream_opens(&self) -> usize {
            self.stream_opens.load(Ordering::SeqCst)
        }

        /// True once every opened stream has been closed
        pub fn streams_closed(&self) -> bool {
            self.stream_tokens
                .lock()
                .unwrap()
                .iter()
                .all(|token| token.is_shutdown())
        }

        fn current_handler(&self) -> Option<Arc<dyn JobEventHandler>> {
            let closed = self.streams_closed();
            let handler = self.handler.lock().unwrap().clone();
            handler.filter(|_| !closed)
        }

        fn find(&self, job_id: &str) -> Result<Job, TransportError> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|job| job.id == job_id)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    status: 404,
                    message: "Job not found".to_string(),
                })
        }

        fn replace(&self, job: Job) {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(slot) = jobs.iter_mut().find(|j| j.id == job.id) {
                *slot = job;
            }
        }
    }

    impl Default for MockJobTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobTransport for MockJobTransport {
        async fn list_jobs(
            &self,
            params: &ListJobsParams,
        ) -> Result<PaginatedJobs, TransportError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);

            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;

            if let Some(error) = self.list_failures.lock().unwrap().pop() {
                return Err(error);
            }

            let limit = params.limit.unwrap_or(50);
            let offset = params.offset.unwrap_or(0);
            let matching: Vec<Job> = self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|job| job.belongs_to(params.tool))
                .filter(|job| params.status.map_or(true, |s| s == job.status))
                .cloned()
                .collect();

            Ok(PaginatedJobs {
                total: matching.len() as u64,
                items: matching
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect(),
                limit,
                offset,
            })
        }

        async fn get_job(&self, job_id: &str) -> Result<Job, TransportError> {
            self.find(job_id)
        }

        async fn delete_job(&self, job_id: &str) -> Result<(), TransportError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);

            if let Some(error) = self.delete_failure.lock().unwrap().clone() {
                return Err(error);
            }
            self.find(job_id)?;
            self.jobs.lock().unwrap().retain(|job| job.id != job_id);
            Ok(())
        }

        async fn cancel_job(&self, job_id: &str) -> Result<Job, TransportError> {
            let mut job = self.find(job_id)?;
            if !job.status.is_cancellable() {
                return Err(TransportError::Status {
                    status: 409,
                    message: "Only running jobs can be cancelled".to_string(),
                });
            }
            job.status = JobStatus::Aborted;
            job.completed_at = job.updated_at.or(Some(job.created_at));
            self.replace(job.clone());
            Ok(job)
        }

        async fn retry_job(&self, job_id: &str) -> Result<Job, TransportError> {
            let mut job = self.find(job_id)?;
            if !job.status.is_retryable() {
                return Err(TransportError::Status {
                    status: 409,
                    message: "Only failed or aborted jobs can be retried".to_string(),
                });
            }
            job.status = JobStatus::Pending;
            job.error_message = None;
            job.started_at = None;
            job.completed_at = None;
            job.attempt += 1;
            self.replace(job.clone());
            Ok(job)
        }

        fn open_stream(&self, handler: Arc<dyn JobEventHandler>) -> StreamHandle {
            self.stream_opens.fetch_add(1, Ordering::SeqCst);

            let (tx, token) = shutdown_channel();
            self.stream_tokens.lock().unwrap().push(token.clone());
            *self.handler.lock().unwrap() = Some(handler);

            self.stream_end.send_replace(false);
            let mut ended = self.stream_end.subscribe();
            let mut token = token;
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let task = runtime.spawn(async move {
                        tokio::select! {
                            _ = token.wait() => {}
                            _ = ended.wait_for(|end| *end) => {}
                        }
                    });
                    StreamHandle::with_task(tx, task)
                }
                Err(_) => StreamHandle::new(tx),
            }
        }
    }
}
