// Push stream task: one SSE connection, reconnected with backoff

use crate::error::map_reqwest_error;
use crate::sse::{SseEvent, SseParser};
use futures::StreamExt;
use noxtools_core::application::{ReconnectDecision, ReconnectPolicy, ShutdownToken};
use noxtools_core::domain::{Job, JobId};
use noxtools_core::port::{JobEvent, JobEventHandler, TransportError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

pub(crate) const EVENT_JOB_CREATED: &str = "job_created";
pub(crate) const EVENT_JOB_UPDATED: &str = "job_updated";
pub(crate) const EVENT_JOB_DELETED: &str = "job_deleted";

#[derive(Deserialize)]
struct JobPayload {
    job: Job,
}

#[derive(Deserialize)]
struct DeletedPayload {
    job_id: JobId,
}

/// Turn a raw SSE event into a job event
///
/// Unknown event names yield `Ok(None)`.
pub(crate) fn decode_event(event: &SseEvent) -> Result<Option<JobEvent>, TransportError> {
    let decoded = match event.event.as_str() {
        EVENT_JOB_CREATED => JobEvent::Created(parse::<JobPayload>(event)?.job),
        EVENT_JOB_UPDATED => JobEvent::Updated(parse::<JobPayload>(event)?.job),
        EVENT_JOB_DELETED => JobEvent::Deleted(parse::<DeletedPayload>(event)?.job_id),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

fn parse<'a, T: Deserialize<'a>>(event: &'a SseEvent) -> Result<T, TransportError> {
    serde_json::from_str(&event.data).map_err(|e| {
        TransportError::Decode(format!("Malformed {} payload: {}", event.event, e))
    })
}

/// Drive the push connection until shutdown or until the policy gives up
///
/// Every failure (connect error, non-2xx, broken or finished body) is
/// reported through `handler.on_error()` before the next attempt.
pub(crate) async fn run_stream(
    client: reqwest::Client,
    url: Url,
    handler: Arc<dyn JobEventHandler>,
    policy: ReconnectPolicy,
    mut shutdown: ShutdownToken,
) {
    let mut attempt: u32 = 0;
    let mut parser = SseParser::new();

    loop {
        if shutdown.is_shutdown() {
            break;
        }

        // A partial event from a dropped connection never completes
        parser.reset();
        let outcome = tokio::select! {
            _ = shutdown.wait() => break,
            outcome = read_stream(&client, &url, handler.as_ref(), &mut parser, &mut attempt) => outcome,
        };

        match outcome {
            Ok(()) => warn!(url = %url, "Job event stream ended"),
            Err(e) => warn!(url = %url, error = %e, attempt, "Job event stream failed"),
        }
        handler.on_error();

        match policy.should_reconnect(attempt, url.as_str()) {
            ReconnectDecision::Retry(delay) => {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
            ReconnectDecision::GiveUp => {
                error!(url = %url, attempts = attempt, "Giving up on job event stream");
                break;
            }
        }
    }

    debug!(url = %url, "Job event stream task finished");
}

/// One connection: returns when the body ends or breaks
async fn read_stream(
    client: &reqwest::Client,
    url: &Url,
    handler: &dyn JobEventHandler,
    parser: &mut SseParser,
    attempt: &mut u32,
) -> Result<(), TransportError> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(map_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            message: format!("Stream request failed with {}", status.as_u16()),
        });
    }

    info!(url = %url, "Job event stream connected");
    *attempt = 0;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        for event in parser.feed(&chunk) {
            deliver(handler, &event);
        }
    }
    Ok(())
}

fn deliver(handler: &dyn JobEventHandler, event: &SseEvent) {
    match decode_event(event) {
        Ok(Some(job_event)) => handler.dispatch(job_event),
        Ok(None) => debug!(event = %event.event, "Ignoring unknown stream event"),
        Err(e) => {
            warn!(error = %e, "Dropping malformed stream event");
            handler.on_error();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noxtools_core::domain::JobTool;

    fn sse(event: &str, data: &str) -> SseEvent {
        SseEvent {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_decode_job_events() {
        let created = decode_event(&sse(
            "job_created",
            r#"{"type":"job_created","job":{"id":"a","tool":"noxtunizer","status":"pending","created_at":"2024-01-01T00:00:00Z"}}"#,
        ))
        .unwrap();
        match created {
            Some(JobEvent::Created(job)) => {
                assert_eq!(job.id, "a");
                assert_eq!(job.tool, JobTool::Noxtunizer);
            }
            other => panic!("unexpected {:?}", other),
        }

        let deleted = decode_event(&sse("job_deleted", r#"{"type":"job_deleted","job_id":"a"}"#));
        assert_eq!(deleted, Ok(Some(JobEvent::Deleted("a".to_string()))));
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        assert_eq!(decode_event(&sse("heartbeat", "{}")), Ok(None));
        assert!(matches!(
            decode_event(&sse("job_updated", "{not json")),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_event(&sse("job_deleted", r#"{"id":"a"}"#)),
            Err(TransportError::Decode(_))
        ));
    }
}
