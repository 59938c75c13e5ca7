// Port Layer - Interfaces for external dependencies

pub mod transport;

// Re-exports
pub use transport::{
    JobEvent, JobEventHandler, JobTransport, ListJobsParams, PaginatedJobs, StreamHandle,
    TransportError,
};
