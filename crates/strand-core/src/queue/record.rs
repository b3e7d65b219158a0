//! Task record: one pending unit of work plus its completion resolver.

use chrono::{DateTime, Utc};

use super::completion::Resolver;
use crate::domain::{NamespaceKey, TaskError, TaskId};

/// Metadata + payload for a task waiting in a lane.
///
/// Design:
/// - Lane order (the `VecDeque` position) is authoritative for processing.
/// - `seq` and `submitted_at` are for reporting only.
/// - The payload is taken out exactly once, when the worker starts the task.
/// - `resolve` consumes the record, so a task resolves exactly once.
#[derive(Debug)]
pub struct TaskRecord<P, T> {
    pub task_id: TaskId,
    pub key: NamespaceKey,

    /// Monotonic submission counter of the dispatcher.
    pub seq: u64,

    pub submitted_at: DateTime<Utc>,

    payload: Option<P>,
    resolver: Resolver<T>,
}

impl<P, T> TaskRecord<P, T> {
    pub(crate) fn new(
        task_id: TaskId,
        key: NamespaceKey,
        seq: u64,
        submitted_at: DateTime<Utc>,
        payload: P,
        resolver: Resolver<T>,
    ) -> Self {
        Self {
            task_id,
            key,
            seq,
            submitted_at,
            payload: Some(payload),
            resolver,
        }
    }

    /// Has a worker already taken the payload?
    pub fn is_started(&self) -> bool {
        self.payload.is_none()
    }

    pub(crate) fn take_payload(&mut self) -> Option<P> {
        self.payload.take()
    }

    pub(crate) fn resolve(self, result: Result<T, TaskError>) {
        if !self.resolver.resolve(result) {
            tracing::trace!(task_id = %self.task_id, "completion handle was dropped by submitter");
        }
    }
}
