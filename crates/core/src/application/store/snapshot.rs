// Immutable partition state handed to readers

use crate::domain::Job;
use std::collections::HashMap;

/// State of one partition at one instant
///
/// Published as `Arc<JobsSnapshot>`; readers never see a half-applied
/// mutation and never mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobsSnapshot {
    /// Sorted by `created_at` descending, ties in first-seen order
    pub jobs: Vec<Job>,
    pub loading: bool,
    pub error: Option<String>,
    /// Increments on every publish of the partition
    pub version: u64,
    index: HashMap<String, usize>,
}

impl JobsSnapshot {
    pub(crate) fn new(jobs: Vec<Job>, loading: bool, error: Option<String>, version: u64) -> Self {
        let index = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.id.clone(), i))
            .collect();
        Self {
            jobs,
            loading,
            error,
            version,
            index,
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.index.get(job_id).map(|&i| &self.jobs[i])
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.index.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id.as_str()).collect()
    }
}
