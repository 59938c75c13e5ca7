//! Tool-specific result payloads
//!
//! The cache keeps `Job::result` as raw JSON. Consumers narrow it with
//! [`ToolResult::from_value`], which picks the variant from the job's tool.

use super::error::{DomainError, Result};
use super::job::JobTool;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Result payload, one variant per tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum ToolResult {
    Noxsongizer(StemsResult),
    Noxelizer(VideoResult),
    Noxtubizer(YoutubeResult),
    Noxtunizer(AnalysisResult),
}

impl ToolResult {
    pub fn from_value(tool: JobTool, value: &serde_json::Value) -> Result<Self> {
        Ok(match tool {
            JobTool::Noxsongizer => ToolResult::Noxsongizer(decode(tool, value)?),
            JobTool::Noxelizer => ToolResult::Noxelizer(decode(tool, value)?),
            JobTool::Noxtubizer => ToolResult::Noxtubizer(decode(tool, value)?),
            JobTool::Noxtunizer => ToolResult::Noxtunizer(decode(tool, value)?),
        })
    }

    pub fn tool(&self) -> JobTool {
        match self {
            ToolResult::Noxsongizer(_) => JobTool::Noxsongizer,
            ToolResult::Noxelizer(_) => JobTool::Noxelizer,
            ToolResult::Noxtubizer(_) => JobTool::Noxtubizer,
            ToolResult::Noxtunizer(_) => JobTool::Noxtunizer,
        }
    }

    /// Files a user can download for this result
    pub fn files(&self) -> Vec<String> {
        match self {
            ToolResult::Noxsongizer(r) => r.stems.clone(),
            ToolResult::Noxelizer(r) => r.video.iter().cloned().collect(),
            ToolResult::Noxtubizer(r) => {
                let mut files = Vec::new();
                if let Some(audio) = &r.audio {
                    files.push(audio.filename.clone());
                }
                if let Some(video) = &r.video {
                    files.push(video.filename.clone());
                }
                if let Some(both) = &r.both {
                    files.push(both.filename.clone());
                }
                files
            }
            ToolResult::Noxtunizer(_) => Vec::new(),
        }
    }
}

fn decode<T: DeserializeOwned + Default>(tool: JobTool, value: &serde_json::Value) -> Result<T> {
    match value {
        serde_json::Value::Null => Ok(T::default()),
        serde_json::Value::Object(map) if map.is_empty() => Ok(T::default()),
        serde_json::Value::Object(_) => {
            serde_json::from_value(value.clone()).map_err(|e| DomainError::ResultShape {
                tool: tool.to_string(),
                reason: e.to_string(),
            })
        }
        other => Err(DomainError::ResultShape {
            tool: tool.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

/// Noxsongizer: separated stems
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StemsResult {
    #[serde(default)]
    pub stems: Vec<String>,
}

/// Noxelizer: rendered video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub video: Option<String>,
    pub frames_written: Option<u64>,
    pub fps: Option<f64>,
    pub duration: Option<f64>,
    pub final_hold: Option<f64>,
    pub codec: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YoutubeMode {
    #[default]
    Audio,
    Video,
    Both,
}

/// Noxtubizer: extracted media
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YoutubeResult {
    #[serde(default)]
    pub mode: YoutubeMode,
    pub source_title: Option<String>,
    pub safe_title: Option<String>,
    pub url: Option<String>,
    pub audio: Option<AudioInfo>,
    pub video: Option<VideoInfo>,
    pub both: Option<BothInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub filename: String,
    pub format: String,
    pub quality: String,
    pub real_bitrate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub filename: String,
    pub format: String,
    pub quality: String,
    pub has_audio: bool,
    pub real_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BothInfo {
    pub filename: String,
    pub format: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub has_audio: bool,
    pub real_height: Option<u32>,
    pub real_bitrate: Option<u32>,
}

/// Noxtunizer: audio analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub duration_label: String,
}
