//! Ordered construction of wrappers
//!
//! Wrapper construction is split into two priority levels: `populate`
//! (copy every translated property onto the shadow target, which may
//! stub-register further values) and `seal` (fix the shadow's
//! extensibility to the origin's). A top-level wrap call drains the queue
//! with a trampoline until it is empty, so every member of a newly
//! discovered subgraph — cyclic members included — reaches `sealed`
//! before control returns to the caller. No recursion, no self-replacing
//! lazy accessors.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use osmo_graph::{GraphError, GraphResult, ObjectId};

use crate::domain::Domain;

/// The property-copy level; drained before any sealing
pub const LEVEL_POPULATE: &str = "populate";
/// The extensibility-fixing level
pub const LEVEL_SEAL: &str = "seal";

/// A deferred unit of construction work
pub type ScheduledJob = Box<dyn FnOnce() -> GraphResult<()> + Send>;

/// Callback waiting for a specific wrapper to finish sealing
pub type PendingCallback = Box<dyn FnOnce() -> GraphResult<()> + Send>;

/// (value identity, domain) a pending callback waits on
pub type PendingKey = (ObjectId, Domain);

/// Ordered list of named priority levels, each a FIFO job list
pub struct SchedulerQueue {
    levels: Vec<(&'static str, std::collections::VecDeque<ScheduledJob>)>,
}

impl SchedulerQueue {
    /// Create a queue with the given levels, earliest first
    pub fn with_levels(names: &[&'static str]) -> Self {
        Self {
            levels: names
                .iter()
                .map(|name| (*name, std::collections::VecDeque::new()))
                .collect(),
        }
    }

    /// Append a job to the named level
    pub fn enqueue(&mut self, level: &str, job: ScheduledJob) -> GraphResult<()> {
        let slot = self
            .levels
            .iter_mut()
            .find(|(name, _)| *name == level)
            .ok_or_else(|| GraphError::type_error(format!("unknown scheduler level '{level}'")))?;
        slot.1.push_back(job);
        Ok(())
    }

    /// Pop the head of the earliest non-empty level
    pub fn pop_earliest(&mut self) -> Option<(&'static str, ScheduledJob)> {
        for (name, jobs) in &mut self.levels {
            if let Some(job) = jobs.pop_front() {
                return Some((name, job));
            }
        }
        None
    }

    /// Discard every queued job in every level
    pub fn clear(&mut self) {
        for (_, jobs) in &mut self.levels {
            jobs.clear();
        }
    }

    /// Whether all levels are empty
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|(_, jobs)| jobs.is_empty())
    }
}

/// Trampoline scheduler driving populate/seal work
pub struct ConstructionScheduler {
    queue: Mutex<SchedulerQueue>,
    draining: AtomicBool,
    pending: Mutex<FxHashMap<PendingKey, Vec<PendingCallback>>>,
    ready: Mutex<std::collections::VecDeque<PendingCallback>>,
}

impl Default for ConstructionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionScheduler {
    /// Create a scheduler with the standard populate/seal levels
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(SchedulerQueue::with_levels(&[LEVEL_POPULATE, LEVEL_SEAL])),
            draining: AtomicBool::new(false),
            pending: Mutex::new(FxHashMap::default()),
            ready: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    /// Enqueue a job on the named level
    pub fn enqueue(&self, level: &str, job: ScheduledJob) -> GraphResult<()> {
        self.queue.lock().enqueue(level, job)
    }

    /// Defer a callback until [`notify_sealed`](Self::notify_sealed) fires
    /// for the key
    pub fn defer_until_sealed(&self, key: PendingKey, callback: PendingCallback) {
        self.pending.lock().entry(key).or_default().push(callback);
    }

    /// Release the callbacks waiting on the key
    ///
    /// They run in registration order once the current drain's job queue
    /// is empty, never in the middle of construction.
    pub fn notify_sealed(&self, key: &PendingKey) {
        let callbacks = self.pending.lock().remove(key).unwrap_or_default();
        self.ready.lock().extend(callbacks);
    }

    /// Drain the queue until empty, then run the released callbacks
    ///
    /// Re-entrant calls (a wrap reached from inside a populate job) are
    /// no-ops; the outermost trampoline services everything, including
    /// work discovered mid-drain. A failing job discards every remaining
    /// queued job and callback and surfaces as `ConstructionFailure`; a
    /// failing callback discards the same but propagates its error as-is.
    /// Entries already sealed stay valid, and partially populated entries
    /// are not rolled back.
    pub fn drain(&self) -> GraphResult<()> {
        if self.draining.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.drive();
        self.draining.store(false, Ordering::Release);
        result.map_err(|e| {
            self.queue.lock().clear();
            self.pending.lock().clear();
            self.ready.lock().clear();
            e
        })
    }

    /// Alternate between exhausting the job queue and running released
    /// callbacks (which may themselves enqueue construction work)
    fn drive(&self) -> GraphResult<()> {
        loop {
            self.run_to_exhaustion()
                .map_err(|e| GraphError::ConstructionFailure(Box::new(e)))?;
            let next = self.ready.lock().pop_front();
            match next {
                Some(callback) => callback()?,
                None => return Ok(()),
            }
        }
    }

    fn run_to_exhaustion(&self) -> GraphResult<()> {
        loop {
            // Lock released before the job runs: jobs enqueue more work
            let next = self.queue.lock().pop_earliest();
            match next {
                Some((level, job)) => {
                    trace!(level, "running construction job");
                    job()?;
                }
                None => return Ok(()),
            }
        }
    }
}
