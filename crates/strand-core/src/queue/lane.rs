//! Key lane: the FIFO of pending tasks for one namespace key.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use super::{LaneState, TaskRecord};
use crate::domain::{NamespaceKey, SubmitError, TaskError, TaskId};

/// One lane per key. Its state is guarded by its own mutex so unrelated
/// lanes never contend.
///
/// Invariants:
/// - at most one worker drains the lane (`LaneState::Draining`)
/// - tasks leave the lane only from the head, in insertion order
/// - the head's payload is taken when the worker starts it; the head is
///   popped and resolved in one critical section when the apply call returns
#[derive(Debug)]
pub struct KeyLane<P, T> {
    key: NamespaceKey,
    inner: Mutex<LaneInner<P, T>>,
}

impl<P, T> KeyLane<P, T> {
    pub(crate) fn new(key: NamespaceKey) -> Self {
        Self {
            key,
            inner: Mutex::new(LaneInner {
                pending: VecDeque::new(),
                state: LaneState::Idle,
                generations: 0,
                in_flight: None,
                closed: false,
            }),
        }
    }

    pub fn key(&self) -> &NamespaceKey {
        &self.key
    }

    /// Critical sections never await and never leave the state half-written,
    /// so a poisoned lock is still consistent.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LaneInner<P, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> LaneStatus {
        let inner = self.lock();
        LaneStatus {
            key: self.key.to_string(),
            pending: inner.pending.len(),
            worker_active: inner.state.is_draining(),
        }
    }
}

/// Point-in-time view of one lane. May be stale as soon as it is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub key: String,
    /// Waiting tasks plus the one being applied.
    pub pending: usize,
    pub worker_active: bool,
}

#[derive(Debug)]
pub(crate) struct LaneInner<P, T> {
    pending: VecDeque<TaskRecord<P, T>>,
    state: LaneState,
    generations: u64,
    in_flight: Option<AbortHandle>,
    closed: bool,
}

/// Result of appending a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Enqueued {
    /// 1-based, counting everything ahead of the task and the task itself.
    pub position: usize,
    /// `Some(generation)` when this submit moved the lane Idle -> Draining
    /// and must start the worker.
    pub start_worker: Option<u64>,
}

/// What the worker should do next.
#[derive(Debug)]
pub(crate) enum Next<P> {
    Run { task_id: TaskId, seq: u64, payload: P },
    Empty,
    Closed,
}

/// Tasks resolved by a forced shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Abandoned {
    pub timed_out: usize,
    pub cancelled: usize,
}

impl<P, T> LaneInner<P, T> {
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn state(&self) -> LaneState {
        self.state
    }

    /// Append a task. Claims the lane for a new worker if it is idle; the
    /// check and the flip happen under the same lock as the append.
    pub(crate) fn enqueue(
        &mut self,
        record: TaskRecord<P, T>,
        limit: Option<usize>,
    ) -> Result<Enqueued, SubmitError> {
        if self.closed {
            return Err(SubmitError::ShuttingDown);
        }
        if let Some(limit) = limit
            && self.pending.len() >= limit
        {
            return Err(SubmitError::LaneFull {
                key: record.key.clone(),
                limit,
            });
        }

        self.pending.push_back(record);
        let position = self.pending.len();

        let start_worker = match self.state {
            LaneState::Idle => {
                self.generations += 1;
                self.state = LaneState::Draining {
                    generation: self.generations,
                };
                Some(self.generations)
            }
            LaneState::Draining { .. } => None,
        };

        Ok(Enqueued {
            position,
            start_worker,
        })
    }

    /// Take the head's payload. The record itself stays at the head until
    /// `finish` so status counts it and position reporting includes it.
    pub(crate) fn next(&mut self) -> Next<P> {
        if self.closed {
            return Next::Closed;
        }
        let Some(head) = self.pending.front_mut() else {
            return Next::Empty;
        };
        match head.take_payload() {
            Some(payload) => Next::Run {
                task_id: head.task_id,
                seq: head.seq,
                payload,
            },
            None => unreachable!(
                "lane key={} head {} already started: two workers on one lane",
                head.key, head.task_id
            ),
        }
    }

    /// Remember the running apply call so a forced shutdown can abort it.
    /// Returns `false` (and aborts) if the task is no longer the head.
    pub(crate) fn track_in_flight(&mut self, task_id: TaskId, abort: AbortHandle) -> bool {
        let is_head = self.pending.front().map(|r| r.task_id) == Some(task_id);
        if self.closed || !is_head {
            abort.abort();
            return false;
        }
        self.in_flight = Some(abort);
        true
    }

    /// Pop and resolve the head. Returns `false` if shutdown already took it.
    pub(crate) fn finish(&mut self, task_id: TaskId, result: Result<T, TaskError>) -> bool {
        match self.pending.front() {
            Some(head) if head.task_id == task_id => {}
            _ => return false,
        }
        self.in_flight = None;
        match self.pending.pop_front() {
            Some(record) => {
                record.resolve(result);
                true
            }
            None => false,
        }
    }

    /// Draining -> Idle if nothing is pending. The caller must also hold the
    /// registry lock so a concurrent submit either lands before this check
    /// (and is seen) or after it (and starts a fresh worker).
    pub(crate) fn try_park(&mut self) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        if self.state == LaneState::Idle {
            tracing::error!("lane parked twice; more than one worker was draining it");
            debug_assert!(false, "lane parked twice");
        }
        self.state = LaneState::Idle;
        true
    }

    /// Worker exit after shutdown closed the lane.
    pub(crate) fn release(&mut self) {
        self.state = LaneState::Idle;
    }

    /// Discard everything that has not started yet.
    pub(crate) fn cancel_waiting(&mut self) -> usize {
        let keep = usize::from(self.pending.front().is_some_and(TaskRecord::is_started));
        let discarded: Vec<_> = self.pending.drain(keep..).collect();
        let count = discarded.len();
        for record in discarded {
            record.resolve(Err(TaskError::Cancelled));
        }
        count
    }

    /// Forced shutdown: close the lane, abort the running apply call and
    /// resolve every remaining task.
    pub(crate) fn abandon(&mut self) -> Abandoned {
        self.closed = true;
        if let Some(abort) = self.in_flight.take() {
            abort.abort();
        }

        let mut abandoned = Abandoned::default();
        for record in self.pending.drain(..) {
            if record.is_started() {
                abandoned.timed_out += 1;
                record.resolve(Err(TaskError::TimedOut));
            } else {
                abandoned.cancelled += 1;
                record.resolve(Err(TaskError::Cancelled));
            }
        }
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApplyError;
    use crate::queue::completion::{CompletionHandle, completion};
    use chrono::Utc;
    use ulid::Ulid;

    type Lane = KeyLane<&'static str, usize>;

    fn key() -> NamespaceKey {
        NamespaceKey::parse("g1").unwrap()
    }

    fn record(seq: u64, payload: &'static str) -> (TaskRecord<&'static str, usize>, CompletionHandle<usize>) {
        let task_id = TaskId::from_ulid(Ulid::new());
        let (resolver, handle) = completion(task_id);
        (
            TaskRecord::new(task_id, key(), seq, Utc::now(), payload, resolver),
            handle,
        )
    }

    #[test]
    fn first_enqueue_claims_worker_and_later_ones_do_not() {
        let lane = Lane::new(key());
        let mut inner = lane.lock();

        let (a, _ha) = record(1, "a");
        let (b, _hb) = record(2, "b");

        let first = inner.enqueue(a, None).unwrap();
        let second = inner.enqueue(b, None).unwrap();

        assert_eq!(first, Enqueued { position: 1, start_worker: Some(1) });
        assert_eq!(second, Enqueued { position: 2, start_worker: None });
        assert!(inner.state().is_draining());
    }

    #[tokio::test]
    async fn next_and_finish_follow_fifo() {
        let lane = Lane::new(key());
        let (a, ha) = record(1, "a");
        let (b, hb) = record(2, "b");
        {
            let mut inner = lane.lock();
            inner.enqueue(a, None).unwrap();
            inner.enqueue(b, None).unwrap();
        }

        let mut inner = lane.lock();
        let Next::Run { task_id, payload, .. } = inner.next() else {
            panic!("expected a task");
        };
        assert_eq!(payload, "a");
        // the running task still counts
        assert_eq!(inner.len(), 2);
        assert!(inner.finish(task_id, Ok(1)));

        let Next::Run { task_id, payload, .. } = inner.next() else {
            panic!("expected a task");
        };
        assert_eq!(payload, "b");
        assert!(inner.finish(task_id, Err(TaskError::Failed(ApplyError::new("x")))));

        assert!(matches!(inner.next(), Next::Empty));
        assert!(inner.try_park());
        assert_eq!(inner.state(), LaneState::Idle);
        drop(inner);

        assert_eq!(ha.await, Ok(1));
        assert!(hb.await.is_err());
    }

    #[test]
    fn park_refuses_when_work_arrived() {
        let lane = Lane::new(key());
        let mut inner = lane.lock();
        let (a, _ha) = record(1, "a");
        inner.enqueue(a, None).unwrap();

        assert!(!inner.try_park());
        assert!(inner.state().is_draining());
    }

    #[test]
    fn limit_counts_running_head() {
        let lane = Lane::new(key());
        let mut inner = lane.lock();
        let (a, _ha) = record(1, "a");
        let (b, _hb) = record(2, "b");
        inner.enqueue(a, Some(1)).unwrap();
        let _ = inner.next();

        let err = inner.enqueue(b, Some(1)).unwrap_err();
        assert_eq!(err, SubmitError::LaneFull { key: key(), limit: 1 });
    }

    #[tokio::test]
    async fn cancel_waiting_keeps_started_head() {
        let lane = Lane::new(key());
        let mut inner = lane.lock();
        let (a, _ha) = record(1, "a");
        let (b, hb) = record(2, "b");
        let (c, hc) = record(3, "c");
        inner.enqueue(a, None).unwrap();
        inner.enqueue(b, None).unwrap();
        inner.enqueue(c, None).unwrap();
        let _ = inner.next();

        assert_eq!(inner.cancel_waiting(), 2);
        assert_eq!(inner.len(), 1);
        drop(inner);

        assert_eq!(hb.await, Err(TaskError::Cancelled));
        assert_eq!(hc.await, Err(TaskError::Cancelled));
    }

    #[tokio::test]
    async fn abandon_times_out_head_and_cancels_rest() {
        let lane = Lane::new(key());
        let mut inner = lane.lock();
        let (a, ha) = record(1, "a");
        let (b, hb) = record(2, "b");
        inner.enqueue(a, None).unwrap();
        inner.enqueue(b, None).unwrap();
        let Next::Run { task_id, .. } = inner.next() else {
            panic!("expected a task");
        };

        let abandoned = inner.abandon();
        assert_eq!(abandoned, Abandoned { timed_out: 1, cancelled: 1 });
        assert!(matches!(inner.next(), Next::Closed));
        // the worker comes back late and finds its task gone
        assert!(!inner.finish(task_id, Ok(9)));
        drop(inner);

        assert_eq!(ha.await, Err(TaskError::TimedOut));
        assert_eq!(hb.await, Err(TaskError::Cancelled));
    }

    #[test]
    fn status_reports_pending_and_worker() {
        let lane = Lane::new(key());
        let (a, _ha) = record(1, "a");
        lane.lock().enqueue(a, None).unwrap();

        let status = lane.status();
        assert_eq!(status.key, "g1");
        assert_eq!(status.pending, 1);
        assert!(status.worker_active);
    }
}
