//! Job Cache Store
//!
//! Process-wide source of truth for every job the client knows about.
//! Jobs are kept per query partition, merged from paginated fetches and push
//! events, and published to subscribers as immutable snapshots.
//!
//! - At most one initial fetch per partition (shared in-flight future)
//! - At most one push connection for the whole store
//! - Fetch responses never overwrite entries written by newer push events
//! - Failures end up in the snapshot's `error`, never in a listener

mod partition;
mod query;
mod snapshot;

pub use query::JobQuery;
pub use snapshot::JobsSnapshot;

use crate::application::constants::BACKEND_UNREACHABLE;
use crate::domain::{Job, JobId};
use crate::error::Result;
use crate::port::{JobEventHandler, JobTransport, PaginatedJobs, StreamHandle, TransportError};
use futures::future::{BoxFuture, FutureExt, Shared};
use partition::{InFlightFetch, Listener, ListenerSlot, Notification, Partition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Completion of a partition fetch; clones resolve together
pub type FetchFuture = Shared<BoxFuture<'static, ()>>;

/// Diagnostics counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub partitions: usize,
    pub listeners: usize,
    pub subscriptions: usize,
    pub stream_open: bool,
}

#[derive(Default)]
struct StoreState {
    partitions: HashMap<String, Partition>,
    /// Bumped on every push-side write
    epoch: u64,
    /// Epoch of each deletion seen while a fetch was in flight
    tombstones: HashMap<JobId, u64>,
    next_fetch_id: u64,
}

impl StoreState {
    fn partition(&mut self, query: &JobQuery) -> &mut Partition {
        self.partitions
            .entry(query.cache_key())
            .or_insert_with(|| Partition::new(query.clone()))
    }

    fn fetch_in_flight(&self) -> bool {
        self.partitions.values().any(|p| p.fetch.is_some())
    }

    /// Forget deletions no in-flight fetch can still resurrect
    fn prune_tombstones(&mut self) {
        let oldest = self
            .partitions
            .values()
            .filter_map(|p| p.fetch.as_ref().map(|f| f.started))
            .min();
        match oldest {
            Some(started) => self.tombstones.retain(|_, deleted| *deleted >= started),
            None => self.tombstones.clear(),
        }
    }
}

/// The push connection owned by the store
#[derive(Default)]
struct StreamSlot {
    handle: Option<StreamHandle>,
    subscriptions: usize,
}

impl StreamSlot {
    fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }
}

/// Job cache store
///
/// Created once per process with [`JobStore::new`] and shared as
/// `Arc<JobStore>`. Fetches are driven on the current tokio runtime.
pub struct JobStore {
    transport: Arc<dyn JobTransport>,
    state: Mutex<StoreState>,
    stream: Mutex<StreamSlot>,
    next_listener_id: AtomicU64,
    weak_self: Weak<JobStore>,
}

impl JobStore {
    pub fn new(transport: Arc<dyn JobTransport>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            transport,
            state: Mutex::new(StoreState::default()),
            stream: Mutex::new(StreamSlot::default()),
            next_listener_id: AtomicU64::new(1),
            weak_self: weak_self.clone(),
        })
    }

    pub fn transport(&self) -> &Arc<dyn JobTransport> {
        &self.transport
    }

    // ------------------------------------------------------------------
    // Partitions and reads
    // ------------------------------------------------------------------

    /// Create the partition for `query` if missing; returns its cache key
    pub fn ensure_partition(&self, query: &JobQuery) -> String {
        let mut state = self.lock_state();
        state.partition(query);
        query.cache_key()
    }

    /// Current snapshot of the partition for `query`
    pub fn snapshot(&self, query: &JobQuery) -> Arc<JobsSnapshot> {
        self.lock_state().partition(query).snapshot()
    }

    pub fn stats(&self) -> StoreStats {
        let (partitions, listeners) = {
            let state = self.lock_state();
            let listeners = state.partitions.values().map(|p| p.listeners.len()).sum();
            (state.partitions.len(), listeners)
        };
        let stream = self.lock_stream();
        StoreStats {
            partitions,
            listeners,
            subscriptions: stream.subscriptions,
            stream_open: stream.is_open(),
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a change listener for `query`
    ///
    /// Starts the shared push stream and the partition's initial fetch if
    /// they are not running yet. Dropping the returned guard removes only
    /// the listener; cached data stays for the next subscriber.
    pub fn subscribe<F>(&self, query: &JobQuery, listener: F) -> Subscription
    where
        F: Fn(&Arc<JobsSnapshot>) + Send + Sync + 'static,
    {
        self.register(query, Arc::new(listener))
    }

    /// Subscribe and receive snapshots through a watch channel
    pub fn watch(&self, query: &JobQuery) -> (Subscription, watch::Receiver<Arc<JobsSnapshot>>) {
        let rx = self.lock_state().partition(query).watch();
        let subscription = self.register(query, Arc::new(|_: &Arc<JobsSnapshot>| {}));
        (subscription, rx)
    }

    fn register(&self, query: &JobQuery, listener: Listener) -> Subscription {
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let key = {
            let mut state = self.lock_state();
            state
                .partition(query)
                .listeners
                .insert(listener_id, ListenerSlot::new(listener));
            query.cache_key()
        };

        self.lock_stream().subscriptions += 1;
        self.ensure_stream();
        let _ = self.ensure_initial_fetch(query);

        debug!(partition = %key, listener_id, "Subscribed to job partition");

        Subscription {
            store: self.weak_self.clone(),
            key,
            listener_id,
            active: true,
        }
    }

    fn unregister(&self, key: &str, listener_id: u64) {
        let removed = {
            let mut state = self.lock_state();
            state
                .partitions
                .get_mut(key)
                .and_then(|p| p.listeners.remove(&listener_id))
                .is_some()
        };
        if removed {
            let mut stream = self.lock_stream();
            stream.subscriptions = stream.subscriptions.saturating_sub(1);
            debug!(partition = %key, listener_id, "Unsubscribed from job partition");
        }
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Run the partition's initial fetch once
    ///
    /// Returns the in-flight fetch if one is running, or an already
    /// completed future when the partition has loaded.
    pub fn ensure_initial_fetch(&self, query: &JobQuery) -> FetchFuture {
        self.start_fetch(query, false)
    }

    /// Fetch the partition again
    ///
    /// Cached entries written by push events after the refresh started win
    /// over the response. Joins a fetch that is already in flight. Reopens
    /// the push stream if it gave up while subscribers remain.
    pub fn refresh(&self, query: &JobQuery) -> FetchFuture {
        let subscribed = self.lock_stream().subscriptions > 0;
        if subscribed {
            self.ensure_stream();
        }
        self.start_fetch(query, true)
    }

    fn start_fetch(&self, query: &JobQuery, force: bool) -> FetchFuture {
        let (future, notification) = {
            let mut state = self.lock_state();
            let fetch_id = state.next_fetch_id;
            let started = state.epoch + 1;
            let baseline = if force { started } else { 0 };
            let partition = state.partition(query);

            if let Some(in_flight) = &partition.fetch {
                return in_flight.future.clone();
            }
            if partition.initial_fetch_done && !force {
                return completed();
            }

            let future = self.fetch_future(query, fetch_id);
            partition.fetch = Some(InFlightFetch {
                id: fetch_id,
                baseline,
                started,
                future: future.clone(),
            });
            partition.loading = true;
            let notification = partition.publish();
            state.next_fetch_id += 1;
            (future, notification)
        };

        notification.deliver();
        self.drive(future.clone());
        future
    }

    fn fetch_future(&self, query: &JobQuery, fetch_id: u64) -> FetchFuture {
        let store = self.weak_self.clone();
        let transport = self.transport.clone();
        let params = query.list_params();
        let key = query.cache_key();

        async move {
            let result = transport.list_jobs(&params).await;
            if let Some(store) = store.upgrade() {
                store.finish_fetch(&key, fetch_id, result);
            }
        }
        .boxed()
        .shared()
    }

    fn drive(&self, future: FetchFuture) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
            }
            Err(_) => warn!("No tokio runtime; job fetch runs only when awaited"),
        }
    }

    fn finish_fetch(
        &self,
        key: &str,
        fetch_id: u64,
        result: std::result::Result<PaginatedJobs, TransportError>,
    ) {
        let notification = {
            let mut state = self.lock_state();
            let StoreState {
                partitions,
                tombstones,
                ..
            } = &mut *state;
            let Some(partition) = partitions.get_mut(key) else {
                return;
            };
            let (baseline, started) = match &partition.fetch {
                Some(in_flight) if in_flight.id == fetch_id => {
                    (in_flight.baseline, in_flight.started)
                }
                // Superseded by dispose() or a newer fetch
                _ => return,
            };

            partition.fetch = None;
            partition.loading = false;

            match result {
                Ok(page) => {
                    let received = page.items.len();
                    let applied = partition.merge_fetched(page.items, baseline, |id| {
                        tombstones.get(id).is_some_and(|deleted| *deleted >= started)
                    });
                    partition.error = None;
                    partition.initial_fetch_done = true;
                    info!(
                        partition = %key,
                        received,
                        applied,
                        total = page.total,
                        "Job fetch completed"
                    );
                }
                Err(e) => {
                    warn!(partition = %key, error = %e, "Job fetch failed");
                    partition.error = Some(e.user_message());
                    partition.initial_fetch_done = false;
                }
            }
            let notification = partition.publish();
            state.prune_tombstones();
            notification
        };
        notification.deliver();
    }

    // ------------------------------------------------------------------
    // Push stream
    // ------------------------------------------------------------------

    /// Open the shared push connection unless one is running
    ///
    /// A connection whose task ended (reconnect attempts exhausted) is
    /// replaced.
    fn ensure_stream(&self) {
        let mut stream = self.lock_stream();
        if stream.is_open() {
            return;
        }

        if stream.handle.take().is_some() {
            info!("Job event stream ended; reopening");
        } else {
            info!("Opening job event stream");
        }
        let handler = Arc::new(StoreEventHandler {
            store: self.weak_self.clone(),
        });
        stream.handle = Some(self.transport.open_stream(handler));
    }

    /// Apply a created/updated job to every matching partition
    pub fn apply_upsert(&self, job: Job) {
        if let Err(e) = job.check_timestamps() {
            debug!(job_id = %job.id, error = %e, "Job timestamps inconsistent with status");
        }

        let notifications = {
            let mut state = self.lock_state();
            state.epoch += 1;
            let epoch = state.epoch;
            state.tombstones.remove(&job.id);

            state
                .partitions
                .values_mut()
                .filter(|p| p.query.matches(&job))
                .map(|p| {
                    p.upsert(job.clone(), epoch);
                    p.error = None;
                    p.initial_fetch_done = true;
                    p.publish()
                })
                .collect::<Vec<_>>()
        };
        debug!(job_id = %job.id, status = %job.status, partitions = notifications.len(), "Job upserted");
        deliver_all(notifications);
    }

    /// Remove a job from every partition holding it
    pub fn apply_delete(&self, job_id: &str) {
        let notifications = {
            let mut state = self.lock_state();
            state.epoch += 1;
            if state.fetch_in_flight() {
                let epoch = state.epoch;
                state.tombstones.insert(job_id.to_string(), epoch);
            }

            state
                .partitions
                .values_mut()
                .filter(|p| p.contains(job_id))
                .map(|p| {
                    p.remove(job_id);
                    p.error = None;
                    p.publish()
                })
                .collect::<Vec<_>>()
        };
        debug!(job_id = %job_id, partitions = notifications.len(), "Job removed");
        deliver_all(notifications);
    }

    /// Mark every partition as unreachable; cached jobs stay
    pub fn apply_stream_error(&self) {
        let notifications = {
            let mut state = self.lock_state();
            state
                .partitions
                .values_mut()
                .map(|p| {
                    p.error = Some(BACKEND_UNREACHABLE.to_string());
                    p.publish()
                })
                .collect::<Vec<_>>()
        };
        warn!(partitions = notifications.len(), "Job event stream error");
        deliver_all(notifications);
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Delete a job on the backend, then drop it from the cache
    ///
    /// On failure the job stays cached and the error is returned.
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.transport.delete_job(job_id).await?;
        info!(job_id = %job_id, "Job deleted");
        self.apply_delete(job_id);
        Ok(())
    }

    /// Cancel a running job and cache the returned state
    pub async fn cancel_job(&self, job_id: &str) -> Result<Job> {
        let job = self.transport.cancel_job(job_id).await?;
        info!(job_id = %job_id, status = %job.status, "Job cancelled");
        self.apply_upsert(job.clone());
        Ok(job)
    }

    /// Retry a failed or aborted job and cache the returned state
    pub async fn retry_job(&self, job_id: &str) -> Result<Job> {
        let job = self.transport.retry_job(job_id).await?;
        info!(job_id = %job_id, attempt = job.attempt, "Job retried");
        self.apply_upsert(job.clone());
        Ok(job)
    }

    /// Re-read one job from the backend and cache it
    pub async fn refresh_job(&self, job_id: &str) -> Result<Job> {
        let job = self.transport.get_job(job_id).await?;
        self.apply_upsert(job.clone());
        Ok(job)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close the push stream and forget every partition
    ///
    /// Outstanding subscriptions become inert; a later subscription starts
    /// the stream and fetches again.
    pub fn dispose(&self) {
        let handle = {
            let mut stream = self.lock_stream();
            stream.subscriptions = 0;
            stream.handle.take()
        };
        if let Some(handle) = handle {
            handle.close();
        }
        let dropped = {
            let mut state = self.lock_state();
            let count = state.partitions.len();
            state.partitions.clear();
            state.tombstones.clear();
            count
        };
        info!(partitions = dropped, "Job store disposed");
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stream(&self) -> MutexGuard<'_, StreamSlot> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn completed() -> FetchFuture {
    futures::future::ready(()).boxed().shared()
}

fn deliver_all(notifications: Vec<Notification>) {
    for notification in notifications {
        notification.deliver();
    }
}

/// Push events routed into the store
///
/// Holds a weak reference so the open stream never keeps the store alive.
struct StoreEventHandler {
    store: Weak<JobStore>,
}

impl JobEventHandler for StoreEventHandler {
    fn on_created(&self, job: Job) {
        if let Some(store) = self.store.upgrade() {
            store.apply_upsert(job);
        }
    }

    fn on_updated(&self, job: Job) {
        if let Some(store) = self.store.upgrade() {
            store.apply_upsert(job);
        }
    }

    fn on_deleted(&self, job_id: JobId) {
        if let Some(store) = self.store.upgrade() {
            store.apply_delete(&job_id);
        }
    }

    fn on_error(&self) {
        if let Some(store) = self.store.upgrade() {
            store.apply_stream_error();
        }
    }
}

/// Listener registration; removes the listener when dropped
pub struct Subscription {
    store: Weak<JobStore>,
    key: String,
    listener_id: u64,
    active: bool,
}

impl Subscription {
    /// Cache key of the partition this subscription listens to
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(store) = self.store.upgrade() {
            store.unregister(&self.key, self.listener_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, JobTool, Timestamp};
    use crate::port::transport::mocks::MockJobTransport;
    use crate::port::JobEvent;

    fn job(id: &str, tool: JobTool, created: &str) -> Job {
        Job::new(id, tool, created.parse::<Timestamp>().unwrap())
    }

    #[tokio::test]
    async fn test_subscribe_fetches_and_opens_stream_once() {
        let transport = Arc::new(MockJobTransport::with_jobs(vec![job(
            "a",
            JobTool::Noxsongizer,
            "2024-01-02T00:00:00Z",
        )]));
        let store = JobStore::new(transport.clone());
        let query = JobQuery::all();

        let _first = store.subscribe(&query, |_| {});
        let _second = store.subscribe(&query, |_| {});
        store.ensure_initial_fetch(&query).await;

        assert_eq!(transport.list_calls(), 1);
        assert_eq!(transport.stream_opens(), 1);
        assert_eq!(store.snapshot(&query).ids(), vec!["a"]);

        let stats = store.stats();
        assert_eq!(stats.partitions, 1);
        assert_eq!(stats.listeners, 2);
        assert_eq!(stats.subscriptions, 2);
        assert!(stats.stream_open);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_data() {
        let transport = Arc::new(MockJobTransport::with_jobs(vec![job(
            "a",
            JobTool::Noxelizer,
            "2024-01-02T00:00:00Z",
        )]));
        let store = JobStore::new(transport.clone());
        let query = JobQuery::all();

        let subscription = store.subscribe(&query, |_| {});
        store.ensure_initial_fetch(&query).await;
        subscription.unsubscribe();

        assert_eq!(store.stats().listeners, 0);
        assert!(store.stats().stream_open);

        let _again = store.subscribe(&query, |_| {});
        assert_eq!(store.snapshot(&query).ids(), vec!["a"]);
        assert_eq!(transport.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_listener_sees_published_snapshot() {
        let transport = Arc::new(MockJobTransport::new());
        let store = JobStore::new(transport.clone());
        let query = JobQuery::for_tool(JobTool::Noxtunizer);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(&query, move |snapshot| {
            sink.lock().unwrap().push(snapshot.len());
        });
        store.ensure_initial_fetch(&query).await;

        transport.emit(JobEvent::Created(job(
            "t",
            JobTool::Noxtunizer,
            "2024-01-02T00:00:00Z",
        )));

        assert_eq!(seen.lock().unwrap().last(), Some(&1));
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_entries() {
        let mut running = job("a", JobTool::Noxelizer, "2024-01-02T00:00:00Z");
        running.status = JobStatus::Running;
        let transport = Arc::new(MockJobTransport::with_jobs(vec![running.clone()]));
        let store = JobStore::new(transport.clone());
        let query = JobQuery::all();

        let _sub = store.subscribe(&query, |_| {});
        store.ensure_initial_fetch(&query).await;

        let mut done = running;
        done.status = JobStatus::Done;
        transport.set_jobs(vec![done]);

        store.refresh(&query).await;
        assert_eq!(transport.list_calls(), 2);
        assert_eq!(
            store.snapshot(&query).get("a").unwrap().status,
            JobStatus::Done
        );
    }

    #[test]
    fn test_fetch_without_runtime_runs_when_awaited() {
        let transport = Arc::new(MockJobTransport::with_jobs(vec![job(
            "a",
            JobTool::Noxtubizer,
            "2024-01-02T00:00:00Z",
        )]));
        let store = JobStore::new(transport.clone());
        let query = JobQuery::all();

        let fetch = store.ensure_initial_fetch(&query);
        assert!(store.snapshot(&query).loading);
        assert_eq!(transport.list_calls(), 0);

        tokio_test::block_on(fetch);
        let snapshot = store.snapshot(&query);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_dispose_closes_stream_and_drops_partitions() {
        let transport = Arc::new(MockJobTransport::new());
        let store = JobStore::new(transport.clone());
        let query = JobQuery::all();

        let sub = store.subscribe(&query, |_| {});
        store.ensure_initial_fetch(&query).await;
        store.dispose();

        assert!(transport.streams_closed());
        let stats = store.stats();
        assert_eq!(stats.partitions, 0);
        assert!(!stats.stream_open);
        drop(sub);

        let _fresh = store.subscribe(&query, |_| {});
        assert_eq!(transport.stream_opens(), 2);
    }
}
