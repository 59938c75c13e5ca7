//! Shared fixtures: job builders, a recording stream handler and a tiny
//! in-process HTTP server with scripted replies.

#![allow(dead_code)]

use noxtools_core::domain::{Job, JobId, JobStatus, JobTool, Timestamp};
use noxtools_core::port::JobEventHandler;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub fn job(id: &str, tool: JobTool, created_secs: i64) -> Job {
    Job::new(id, tool, Timestamp::from_millis(created_secs * 1_000).unwrap())
}

pub fn job_with_status(id: &str, tool: JobTool, created_secs: i64, status: JobStatus) -> Job {
    let mut job = job(id, tool, created_secs);
    job.status = status;
    job
}

pub fn job_json(job: &Job) -> String {
    serde_json::to_string(job).unwrap()
}

/// Stream handler that forwards every callback as a short string
pub struct Recorder {
    tx: mpsc::UnboundedSender<String>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl JobEventHandler for Recorder {
    fn on_created(&self, job: Job) {
        let _ = self.tx.send(format!("created:{}:{}", job.id, job.status));
    }

    fn on_updated(&self, job: Job) {
        let _ = self.tx.send(format!("updated:{}:{}", job.id, job.status));
    }

    fn on_deleted(&self, job_id: JobId) {
        let _ = self.tx.send(format!("deleted:{}", job_id));
    }

    fn on_error(&self) {
        let _ = self.tx.send("error".to_string());
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream callback")
        .expect("recorder closed")
}

/// Scripted reply for one request
#[derive(Clone)]
pub enum Reply {
    Json { status: u16, body: String },
    Text { status: u16, body: String },
    /// SSE response written chunk by chunk; `hold` keeps the socket open
    Sse { chunks: Vec<String>, hold: bool },
}

impl Reply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Reply::Json {
            status,
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Reply::Text {
            status,
            body: body.into(),
        }
    }
}

type Router = Arc<dyn Fn(&str, &str, usize) -> Reply + Send + Sync>;

/// HTTP/1.1 server on 127.0.0.1 with one reply per request
///
/// The router receives the method, the request target (path + query) and
/// the 0-based index of the request.
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start<F>(router: F) -> Self
    where
        F: Fn(&str, &str, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let router: Router = Arc::new(router);

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let router = router.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    serve(socket, router, log).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}/api", addr),
            requests,
        }
    }

    /// `"METHOD target"` for every request seen so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Base URL on a port nothing listens on
pub async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

async fn serve(mut socket: TcpStream, router: Router, log: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let index = {
        let mut log = log.lock().unwrap();
        log.push(format!("{} {}", method, target));
        log.len() - 1
    };

    match router(&method, &target, index) {
        Reply::Json { status, body } => {
            write_full(&mut socket, status, "application/json", &body).await;
        }
        Reply::Text { status, body } => {
            write_full(&mut socket, status, "text/plain", &body).await;
        }
        Reply::Sse { chunks, hold } => {
            let header = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n";
            if socket.write_all(header.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if hold {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }
    }
    let _ = socket.shutdown().await;
}

async fn write_full(socket: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        reason(status),
        content_type,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
