// Partition query: tool filter + pagination of the initial fetch

use crate::application::constants::{ALL_TOOLS_KEY, DEFAULT_LIMIT, DEFAULT_OFFSET};
use crate::domain::{Job, JobTool};
use crate::port::ListJobsParams;

/// Normalized query identifying one store partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobQuery {
    pub tool: Option<JobTool>,
    pub limit: u32,
    pub offset: u32,
}

impl JobQuery {
    /// Normalize a filter, filling in the default limit and offset
    pub fn new(tool: Option<JobTool>, limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            tool,
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            offset: offset.unwrap_or(DEFAULT_OFFSET),
        }
    }

    pub fn all() -> Self {
        Self::new(None, None, None)
    }

    pub fn for_tool(tool: JobTool) -> Self {
        Self::new(Some(tool), None, None)
    }

    /// Canonical key; identical filters share one partition
    pub fn cache_key(&self) -> String {
        let tool = self.tool.map_or(ALL_TOOLS_KEY, |t| t.as_str());
        format!("{}|limit={}|offset={}", tool, self.limit, self.offset)
    }

    pub fn matches(&self, job: &Job) -> bool {
        job.belongs_to(self.tool)
    }

    pub fn list_params(&self) -> ListJobsParams {
        ListJobsParams {
            tool: self.tool,
            status: None,
            limit: Some(self.limit),
            offset: Some(self.offset),
        }
    }
}

impl Default for JobQuery {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_normalizes_defaults() {
        assert_eq!(JobQuery::all().cache_key(), "all|limit=200|offset=0");
        assert_eq!(
            JobQuery::new(Some(JobTool::Noxtubizer), Some(200), Some(0)).cache_key(),
            JobQuery::for_tool(JobTool::Noxtubizer).cache_key()
        );
        assert_eq!(
            JobQuery::new(Some(JobTool::Noxelizer), Some(50), Some(100)).cache_key(),
            "noxelizer|limit=50|offset=100"
        );
    }

    #[test]
    fn test_list_params() {
        let params = JobQuery::for_tool(JobTool::Noxsongizer).list_params();
        assert_eq!(params.tool, Some(JobTool::Noxsongizer));
        assert_eq!(params.limit, Some(200));
        assert_eq!(params.offset, Some(0));
        assert_eq!(params.status, None);
    }
}
