// Domain Layer - Job entity, tool results and timestamps

pub mod error;
pub mod job;
pub mod result;
pub mod timestamp;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobStatus, JobTool};
pub use result::{
    AnalysisResult, AudioInfo, BothInfo, StemsResult, ToolResult, VideoInfo, VideoResult,
    YoutubeMode, YoutubeResult,
};
pub use timestamp::Timestamp;
