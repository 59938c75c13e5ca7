// Store partition: the cached jobs of one query plus its subscribers

use super::query::JobQuery;
use super::snapshot::JobsSnapshot;
use super::FetchFuture;
use crate::domain::{Job, JobId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Change listener registered through `JobStore::subscribe`
pub(crate) type Listener = Arc<dyn Fn(&Arc<JobsSnapshot>) + Send + Sync>;

/// A listener plus its delivery state
///
/// Calls to one listener never overlap and never go back in version. A
/// snapshot published while the listener is running is parked and handed
/// over by the thread already delivering, so the last call always carries
/// the newest snapshot.
pub(crate) struct ListenerSlot {
    listener: Listener,
    delivery: Mutex<Delivery>,
}

#[derive(Default)]
struct Delivery {
    running: bool,
    delivered: u64,
    parked: Option<Arc<JobsSnapshot>>,
}

impl ListenerSlot {
    pub fn new(listener: Listener) -> Arc<Self> {
        Arc::new(Self {
            listener,
            delivery: Mutex::new(Delivery::default()),
        })
    }

    fn deliver(&self, snapshot: Arc<JobsSnapshot>) {
        let mut next = {
            let mut delivery = self.lock();
            let parked = delivery.parked.as_ref().map_or(0, |p| p.version);
            if snapshot.version <= delivery.delivered.max(parked) {
                return;
            }
            if delivery.running {
                delivery.parked = Some(snapshot);
                return;
            }
            delivery.running = true;
            snapshot
        };

        loop {
            (self.listener)(&next);

            let mut delivery = self.lock();
            delivery.delivered = next.version;
            match delivery.parked.take() {
                Some(parked) if parked.version > delivery.delivered => next = parked,
                _ => {
                    delivery.running = false;
                    return;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Entry {
    job: Job,
    /// First-seen order, kept when the entry is replaced
    seq: u64,
    /// Store epoch of the last push-side write (0 = written by a fetch)
    touched: u64,
}

/// Snapshot plus the listeners to call once the store lock is released
pub(crate) struct Notification {
    listeners: Vec<Arc<ListenerSlot>>,
    snapshot: Arc<JobsSnapshot>,
}

impl Notification {
    pub(crate) fn deliver(self) {
        for slot in &self.listeners {
            slot.deliver(self.snapshot.clone());
        }
    }
}

pub(crate) struct InFlightFetch {
    pub id: u64,
    /// Cached entries pushed at or after this epoch win over the response
    pub baseline: u64,
    /// First store epoch after the request went out
    pub started: u64,
    pub future: FetchFuture,
}

pub(crate) struct Partition {
    pub query: JobQuery,
    entries: HashMap<JobId, Entry>,
    next_seq: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub initial_fetch_done: bool,
    pub fetch: Option<InFlightFetch>,
    pub listeners: HashMap<u64, Arc<ListenerSlot>>,
    tx: watch::Sender<Arc<JobsSnapshot>>,
    snapshot: Arc<JobsSnapshot>,
}

impl Partition {
    pub fn new(query: JobQuery) -> Self {
        let snapshot = Arc::new(JobsSnapshot::default());
        let (tx, _) = watch::channel(snapshot.clone());
        Self {
            query,
            entries: HashMap::new(),
            next_seq: 0,
            loading: false,
            error: None,
            initial_fetch_done: false,
            fetch: None,
            listeners: HashMap::new(),
            tx,
            snapshot,
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries.contains_key(job_id)
    }

    pub fn snapshot(&self) -> Arc<JobsSnapshot> {
        self.snapshot.clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<JobsSnapshot>> {
        self.tx.subscribe()
    }

    /// Insert or replace by ID; a replaced entry keeps its slot
    pub fn upsert(&mut self, job: Job, touched: u64) {
        match self.entries.get_mut(&job.id) {
            Some(entry) => {
                entry.job = job;
                entry.touched = touched;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(job.id.clone(), Entry { job, seq, touched });
            }
        }
    }

    /// Merge a fetch response
    ///
    /// Entries written by the push side at or after `baseline` win over the
    /// fetched copy. A baseline of 0 keeps every pre-existing entry. Jobs
    /// for which `deleted` holds are dropped. Returns the number of fetched
    /// jobs applied.
    pub fn merge_fetched<F>(&mut self, jobs: Vec<Job>, baseline: u64, deleted: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut applied = 0;
        for job in jobs {
            if !self.query.matches(&job) || deleted(&job.id) {
                continue;
            }
            let newer_cached = self
                .entries
                .get(&job.id)
                .is_some_and(|entry| entry.touched >= baseline);
            if newer_cached {
                continue;
            }
            self.upsert(job, 0);
            applied += 1;
        }
        applied
    }

    pub fn remove(&mut self, job_id: &str) -> bool {
        self.entries.remove(job_id).is_some()
    }

    /// Rebuild and publish the snapshot
    pub fn publish(&mut self) -> Notification {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        let jobs = entries.into_iter().map(|entry| entry.job.clone()).collect();

        let snapshot = Arc::new(JobsSnapshot::new(
            jobs,
            self.loading,
            self.error.clone(),
            self.snapshot.version + 1,
        ));
        self.snapshot = snapshot.clone();
        self.tx.send_replace(snapshot.clone());

        Notification {
            listeners: self.listeners.values().cloned().collect(),
            snapshot,
        }
    }
}
