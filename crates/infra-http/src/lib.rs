// Noxtools Infrastructure - HTTP Adapter
// Implements: JobTransport over the jobs REST API and its SSE stream

mod client;
mod config;
mod error;
mod sse;
mod stream;

pub use client::HttpJobTransport;
pub use config::{
    ClientConfig, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, ENV_API_URL, ENV_STREAM_MAX_RETRIES,
    ENV_TIMEOUT_SECS,
};
pub use sse::{SseEvent, SseParser};
