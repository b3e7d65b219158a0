//! LaneRegistry - key から lane への対応表
//!
//! # 学習ポイント
//! - ロック順序は常に「registry → lane」（逆順は取らない）
//! - lane の生成（check-then-create）と退役（recheck-then-remove）は
//!   どちらも registry ロックの中で行う
//! - worker 数は `watch` で公開し、shutdown が「0 になるまで待つ」に使う

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::lane::{Enqueued, KeyLane, LaneStatus};
use super::TaskRecord;
use crate::domain::{NamespaceKey, SubmitError};

/// Process-wide mapping from key to lane, scoped to one dispatcher instance.
#[derive(Debug)]
pub struct LaneRegistry<P, T> {
    inner: Mutex<RegistryInner<P, T>>,
    workers: Arc<ActiveWorkers>,
}

#[derive(Debug)]
struct RegistryInner<P, T> {
    lanes: HashMap<NamespaceKey, Arc<KeyLane<P, T>>>,
    accepting: bool,
}

impl<P, T> RegistryInner<P, T> {
    fn resolve(&mut self, key: &NamespaceKey) -> Arc<KeyLane<P, T>> {
        Arc::clone(
            self.lanes
                .entry(key.clone())
                .or_insert_with(|| Arc::new(KeyLane::new(key.clone()))),
        )
    }
}

/// Outcome of a successful submit at the registry level.
#[derive(Debug)]
pub(crate) struct Accepted<P, T> {
    pub lane: Arc<KeyLane<P, T>>,
    pub enqueued: Enqueued,
    /// Present when the caller must spawn the lane's worker.
    pub ticket: Option<WorkerTicket>,
}

/// What a worker learned when it found its lane empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// New work arrived; keep draining.
    Continue,
    /// Lane is idle now.
    Parked { retired: bool },
}

impl<P, T> LaneRegistry<P, T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                lanes: HashMap::new(),
                accepting: true,
            }),
            workers: Arc::new(ActiveWorkers::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner<P, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn workers(&self) -> &Arc<ActiveWorkers> {
        &self.workers
    }

    /// Existing lane for `key`, or a new one. One atomic step.
    pub fn resolve(&self, key: &NamespaceKey) -> Result<Arc<KeyLane<P, T>>, SubmitError> {
        let mut inner = self.lock();
        if !inner.accepting {
            return Err(SubmitError::ShuttingDown);
        }
        Ok(inner.resolve(key))
    }

    /// Resolve the lane and append the record while holding the registry
    /// lock, so the lane cannot be retired between lookup and append.
    ///
    /// The worker ticket is taken under the same lock: once `close` returns,
    /// the active worker count already includes every worker that will ever
    /// be started.
    pub(crate) fn enqueue(
        &self,
        record: TaskRecord<P, T>,
        limit: Option<usize>,
    ) -> Result<Accepted<P, T>, SubmitError> {
        let mut inner = self.lock();
        if !inner.accepting {
            return Err(SubmitError::ShuttingDown);
        }
        let lane = inner.resolve(&record.key);
        let enqueued = lane.lock().enqueue(record, limit)?;
        let ticket = enqueued
            .start_worker
            .map(|_| ActiveWorkers::enter(&self.workers));
        Ok(Accepted {
            lane,
            enqueued,
            ticket,
        })
    }

    /// Remove `key`'s lane if it is idle and empty. Rechecked under the lock.
    pub fn retire(&self, key: &NamespaceKey) -> bool {
        let mut inner = self.lock();
        let idle = match inner.lanes.get(key) {
            Some(lane) => {
                let lane = lane.lock();
                lane.len() == 0 && !lane.state().is_draining()
            }
            None => return false,
        };
        if idle {
            inner.lanes.remove(key);
            tracing::debug!(key = %key, "lane retired");
        }
        idle
    }

    /// Called by a worker whose lane looked empty: park the lane (and
    /// optionally retire it) unless a submit slipped in.
    pub(crate) fn release_if_empty(&self, lane: &Arc<KeyLane<P, T>>, retire: bool) -> Release {
        let mut inner = self.lock();
        if !lane.lock().try_park() {
            return Release::Continue;
        }
        let retired = retire
            && inner
                .lanes
                .get(lane.key())
                .is_some_and(|current| Arc::ptr_eq(current, lane));
        if retired {
            inner.lanes.remove(lane.key());
        }
        Release::Parked { retired }
    }

    /// Stop accepting submissions. Returns the lanes present at that moment.
    pub fn close(&self) -> Vec<Arc<KeyLane<P, T>>> {
        let mut inner = self.lock();
        inner.accepting = false;
        inner.lanes.values().cloned().collect()
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn lanes(&self) -> Vec<Arc<KeyLane<P, T>>> {
        self.lock().lanes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero for unknown (or retired) keys.
    pub fn pending_count(&self, key: &NamespaceKey) -> usize {
        let lane = self.lock().lanes.get(key).cloned();
        lane.map_or(0, |lane| lane.lock().len())
    }

    /// Status of every lane, sorted by key.
    pub fn statuses(&self) -> Vec<LaneStatus> {
        let mut statuses: Vec<LaneStatus> = self.lanes().iter().map(|l| l.status()).collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }
}

impl<P, T> Default for LaneRegistry<P, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of running lane workers, observable asynchronously.
#[derive(Debug)]
pub struct ActiveWorkers {
    tx: watch::Sender<usize>,
}

impl ActiveWorkers {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    /// Count one more worker until the ticket is dropped.
    pub(crate) fn enter(this: &Arc<Self>) -> WorkerTicket {
        this.tx.send_modify(|n| *n += 1);
        WorkerTicket {
            workers: Arc::clone(this),
        }
    }

    /// Resolves once no worker is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so this cannot fail while we wait
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Held by a running worker. Dropping it (normal exit, panic or abort)
/// decrements the count.
#[derive(Debug)]
pub(crate) struct WorkerTicket {
    workers: Arc<ActiveWorkers>,
}

impl Drop for WorkerTicket {
    fn drop(&mut self) {
        self.workers.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}
