//! HTTP JobTransport Implementation

use crate::config::ClientConfig;
use crate::error::{map_reqwest_error, status_error};
use crate::stream::run_stream;
use async_trait::async_trait;
use noxtools_core::application::shutdown_channel;
use noxtools_core::domain::{Job, JobTool};
use noxtools_core::port::{
    JobEventHandler, JobTransport, ListJobsParams, PaginatedJobs, StreamHandle, TransportError,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Jobs API client
///
/// Request/response calls go through a client with the configured request
/// timeout. The SSE connection uses a second client that only has a connect
/// timeout, since the stream is expected to stay open indefinitely.
///
/// # Example
///
/// ```no_run
/// use noxtools_infra_http::{ClientConfig, HttpJobTransport};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpJobTransport::new(ClientConfig::from_env()?)?;
/// println!("{}", transport.base_url());
/// # Ok(())
/// # }
/// ```
pub struct HttpJobTransport {
    client: Client,
    stream_client: Client,
    config: ClientConfig,
}

impl HttpJobTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create client: {}", e)))?;

        let stream_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            client,
            stream_client,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.config.api_url
    }

    /// Download link for one output file of a job
    pub fn download_url(
        &self,
        tool: JobTool,
        job_id: &str,
        filename: &str,
    ) -> Result<Url, TransportError> {
        self.endpoint(&[tool.as_str(), "download", job_id, filename])
    }

    /// Link to a job's uploaded input; `None` for tools without an upload
    pub fn source_url(&self, tool: JobTool, job_id: &str) -> Result<Option<Url>, TransportError> {
        if !tool.has_uploaded_input() {
            return Ok(None);
        }
        self.endpoint(&[tool.as_str(), "source", job_id]).map(Some)
    }

    /// Append percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.config.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.config.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        request.send().await.map_err(map_reqwest_error)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        fallback: String,
    ) -> Result<T, TransportError> {
        if !response.status().is_success() {
            return Err(status_error(response, fallback).await);
        }
        response.json::<T>().await.map_err(map_reqwest_error)
    }

    async fn job_action(&self, job_id: &str, action: &str) -> Result<Job, TransportError> {
        let url = self.endpoint(&["jobs", job_id, action])?;
        debug!(url = %url, "POST job action");
        let response = self.send(self.client.request(Method::POST, url)).await?;
        let fallback = format!("Request failed with {}", response.status().as_u16());
        let job: Job = self.read_json(response, fallback).await?;
        info!(job_id = %job.id, action, status = %job.status, "Job action accepted");
        Ok(job)
    }
}

#[async_trait]
impl JobTransport for HttpJobTransport {
    async fn list_jobs(&self, params: &ListJobsParams) -> Result<PaginatedJobs, TransportError> {
        let url = self.endpoint(&["jobs"])?;
        debug!(url = %url, ?params, "GET jobs");
        let response = self.send(self.client.get(url).query(params)).await?;
        let fallback = format!("Request failed with {}", response.status().as_u16());
        self.read_json(response, fallback).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, TransportError> {
        let url = self.endpoint(&["jobs", job_id])?;
        let response = self.send(self.client.get(url)).await?;
        let fallback = format!("Request failed with {}", response.status().as_u16());
        self.read_json(response, fallback).await
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&["jobs", job_id])?;
        let response = self.send(self.client.delete(url)).await?;
        if !response.status().is_success() {
            return Err(status_error(response, format!("Failed to delete job {}", job_id)).await);
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<Job, TransportError> {
        self.job_action(job_id, "cancel").await
    }

    async fn retry_job(&self, job_id: &str) -> Result<Job, TransportError> {
        self.job_action(job_id, "retry").await
    }

    fn open_stream(&self, handler: Arc<dyn JobEventHandler>) -> StreamHandle {
        let (shutdown, token) = shutdown_channel();

        let url = match self.endpoint(&["jobs", "stream"]) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot build job stream URL");
                handler.on_error();
                return StreamHandle::new(shutdown);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(run_stream(
                    self.stream_client.clone(),
                    url,
                    handler,
                    self.config.reconnect.clone(),
                    token,
                ));
                StreamHandle::with_task(shutdown, task)
            }
            Err(_) => {
                warn!("No tokio runtime; job stream not started");
                handler.on_error();
                StreamHandle::new(shutdown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn transport(base: &str) -> HttpJobTransport {
        assert_ok!(HttpJobTransport::new(assert_ok!(ClientConfig::new(base))))
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let t = transport("http://localhost:8000/api");
        assert_eq!(
            t.endpoint(&["jobs", "abc", "cancel"]).unwrap().as_str(),
            "http://localhost:8000/api/jobs/abc/cancel"
        );

        let t = transport("http://localhost:8000/api/");
        assert_eq!(
            t.endpoint(&["jobs"]).unwrap().as_str(),
            "http://localhost:8000/api/jobs"
        );
    }

    #[test]
    fn test_download_and_source_urls() {
        let t = transport("http://localhost:8000/api");
        assert_eq!(
            t.download_url(JobTool::Noxsongizer, "j1", "vocals final.wav")
                .unwrap()
                .as_str(),
            "http://localhost:8000/api/noxsongizer/download/j1/vocals%20final.wav"
        );
        assert_eq!(
            t.source_url(JobTool::Noxelizer, "j2").unwrap().unwrap().as_str(),
            "http://localhost:8000/api/noxelizer/source/j2"
        );
        assert_eq!(t.source_url(JobTool::Noxtubizer, "j3").unwrap(), None);
    }

    #[test]
    fn test_stream_without_runtime_reports_error() {
        struct Errors(std::sync::atomic::AtomicUsize);
        impl JobEventHandler for Errors {
            fn on_created(&self, _job: Job) {}
            fn on_updated(&self, _job: Job) {}
            fn on_deleted(&self, _job_id: noxtools_core::domain::JobId) {}
            fn on_error(&self) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let t = transport("http://localhost:8000/api");
        let errors = Arc::new(Errors(std::sync::atomic::AtomicUsize::new(0)));
        let handle = t.open_stream(errors.clone());

        assert_eq!(errors.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!handle.is_closed());
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_job_id_segments_are_encoded() {
        let t = transport("http://localhost:8000/api");
        let url = assert_ok!(t.endpoint(&["jobs", "a/b"]));
        assert_eq!(url.as_str(), "http://localhost:8000/api/jobs/a%2Fb");
    }

    #[test]
    fn test_cannot_be_base_url_is_rejected() {
        let mut t = transport("http://localhost:8000/api");
        t.config.api_url = assert_ok!(Url::parse("mailto:ops@example.com"));
        assert_err!(t.endpoint(&["jobs"]));
    }
}
