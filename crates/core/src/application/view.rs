// View handle: one consumer's paginated, selectable window on a partition

use crate::application::constants::DEFAULT_PAGE_SIZE;
use crate::application::pagination::{clamp_page, paginate};
use crate::application::store::{JobQuery, JobStore, JobsSnapshot, Subscription};
use crate::domain::{Job, JobId, JobTool};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// Filter and paging options of a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub tool: Option<JobTool>,
    pub page_size: usize,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ViewOptions {
    pub fn for_tool(tool: JobTool) -> Self {
        Self {
            tool: Some(tool),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            tool: None,
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
            offset: None,
        }
    }
}

/// Everything a presentation layer renders, derived from one snapshot
#[derive(Debug, Clone)]
pub struct ViewState {
    pub jobs: Vec<Job>,
    pub paged_items: Vec<Job>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub loading: bool,
    pub error: Option<String>,
    pub selected_item: Option<Job>,
}

/// Subscribed view over the job store
///
/// Subscribes on creation and unsubscribes on drop. Views built with the
/// same filter share one partition.
pub struct JobView {
    store: Arc<JobStore>,
    query: JobQuery,
    page: usize,
    page_size: usize,
    selected: Option<JobId>,
    rx: watch::Receiver<Arc<JobsSnapshot>>,
    _subscription: Subscription,
}

impl JobView {
    pub fn new(store: Arc<JobStore>, options: ViewOptions) -> Self {
        let query = JobQuery::new(options.tool, options.limit, options.offset);
        let (subscription, rx) = store.watch(&query);
        Self {
            store,
            query,
            page: 1,
            page_size: options.page_size.max(1),
            selected: None,
            rx,
            _subscription: subscription,
        }
    }

    pub fn query(&self) -> &JobQuery {
        &self.query
    }

    /// Latest snapshot of the underlying partition
    pub fn snapshot(&self) -> Arc<JobsSnapshot> {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> ViewState {
        let snapshot = self.snapshot();
        let page = paginate(&snapshot.jobs, self.page, self.page_size);
        let selected_item = self
            .selected
            .as_deref()
            .and_then(|id| snapshot.get(id))
            .cloned();

        ViewState {
            jobs: snapshot.jobs.clone(),
            paged_items: page.items,
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
            loading: snapshot.loading,
            error: snapshot.error.clone(),
            selected_item,
        }
    }

    /// Requested page, before clamping against the current total
    pub fn page(&self) -> usize {
        self.page
    }

    /// Go to a 1-based page; values below 1 become 1
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn select(&mut self, job_id: Option<&str>) {
        self.selected = job_id.map(str::to_string);
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn get_job_by_id(&self, job_id: &str) -> Option<Job> {
        self.snapshot().get(job_id).cloned()
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.store.delete_job(job_id).await
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<Job> {
        self.store.cancel_job(job_id).await
    }

    pub async fn retry_job(&self, job_id: &str) -> Result<Job> {
        self.store.retry_job(job_id).await
    }

    /// Re-fetch the partition this view reads from
    pub async fn refresh(&self) {
        self.store.refresh(&self.query).await;
    }

    /// Wait for the next published snapshot
    ///
    /// The current page is pulled back to the last valid page when the list
    /// shrank. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        if self.rx.changed().await.is_err() {
            return false;
        }
        self.clamp_to_total();
        true
    }

    fn clamp_to_total(&mut self) {
        let total = self.rx.borrow().len();
        self.page = clamp_page(self.page, total, self.page_size);
    }
}
