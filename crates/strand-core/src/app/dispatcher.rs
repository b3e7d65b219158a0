//! Dispatcher - キューの公開エントリポイント
//!
//! # 学習ポイント
//! - `submit` は同期関数: ロックを取って追加するだけで、処理は待たない
//! - lane が Idle なら「Draining への切り替え」と「worker 数の加算」を
//!   追加と同じロック区間で行い、ロックの外で worker を spawn する
//! - 結果が欲しい呼び出し側だけ `CompletionHandle` を await する
//!   （fire-and-forget がデフォルト）

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::builder::DispatcherBuilder;
use super::shutdown::{self, ShutdownMode, ShutdownReport};
use super::status::QueueSnapshot;
use super::worker_loop::WorkerLoop;
use crate::domain::{NamespaceKey, SubmitError, TaskId, WaitError};
use crate::ports::{ApplyEpisode, Clock, IdGenerator};
use crate::queue::{CompletionHandle, LaneRegistry, TaskRecord, completion};

/// Accepted submission.
#[derive(Debug)]
pub struct Submission<T> {
    pub task_id: TaskId,
    pub key: NamespaceKey,
    /// 1-based position in the lane at acceptance, including the running
    /// task and this one.
    pub position: usize,
    pub handle: CompletionHandle<T>,
}

impl<T> Submission<T> {
    pub fn accepted_message(&self, name: &str) -> String {
        format!(
            "Episode '{name}' queued for processing (position: {})",
            self.position
        )
    }

    pub fn into_handle(self) -> CompletionHandle<T> {
        self.handle
    }
}

pub(crate) struct DispatcherParts<A: ApplyEpisode> {
    pub apply: Arc<A>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub runtime: Handle,
    pub max_pending_per_lane: Option<usize>,
    pub retire_idle_lanes: bool,
}

struct Inner<A: ApplyEpisode> {
    registry: Arc<LaneRegistry<A::Payload, A::Output>>,
    apply: Arc<A>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    runtime: Handle,
    seq: AtomicU64,
    max_pending_per_lane: Option<usize>,
    retire_idle_lanes: bool,
}

/// Per-key sequential processing queue.
///
/// Cheap to clone; clones share the same registry. Construct one at service
/// startup (see [`Dispatcher::builder`]) and call [`Dispatcher::shutdown`]
/// at service stop.
pub struct Dispatcher<A: ApplyEpisode> {
    inner: Arc<Inner<A>>,
}

impl<A: ApplyEpisode> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ApplyEpisode> Dispatcher<A> {
    pub fn builder(apply: A) -> DispatcherBuilder<A> {
        DispatcherBuilder::new(apply)
    }

    pub(crate) fn from_parts(parts: DispatcherParts<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(LaneRegistry::new()),
                apply: parts.apply,
                clock: parts.clock,
                ids: parts.ids,
                runtime: parts.runtime,
                seq: AtomicU64::new(0),
                max_pending_per_lane: parts.max_pending_per_lane,
                retire_idle_lanes: parts.retire_idle_lanes,
            }),
        }
    }

    /// Validate `key` and enqueue `payload` on its lane. Returns as soon as
    /// the task is appended.
    pub fn submit(
        &self,
        key: &str,
        payload: A::Payload,
    ) -> Result<Submission<A::Output>, SubmitError> {
        let key = NamespaceKey::parse(key)?;
        self.submit_to(key, payload)
    }

    pub fn submit_to(
        &self,
        key: NamespaceKey,
        payload: A::Payload,
    ) -> Result<Submission<A::Output>, SubmitError> {
        let inner = &self.inner;
        let task_id = inner.ids.generate_task_id();
        let seq = inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let (resolver, handle) = completion(task_id);
        let record = TaskRecord::new(
            task_id,
            key.clone(),
            seq,
            inner.clock.now(),
            payload,
            resolver,
        );

        let accepted = match inner.registry.enqueue(record, inner.max_pending_per_lane) {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(key = %key, error = %err, "submission rejected");
                return Err(err);
            }
        };

        let position = accepted.enqueued.position;
        debug!(key = %key, %task_id, seq, position, "task accepted");

        if let (Some(generation), Some(ticket)) = (accepted.enqueued.start_worker, accepted.ticket)
        {
            let worker = WorkerLoop::new(
                generation,
                accepted.lane,
                Arc::clone(&inner.registry),
                Arc::clone(&inner.apply),
                inner.retire_idle_lanes,
                ticket,
            );
            inner.runtime.spawn(worker.run());
        }

        Ok(Submission {
            task_id,
            key,
            position,
            handle,
        })
    }

    /// Enqueue in order with everyone else, then wait for this task's result.
    pub async fn submit_and_wait(
        &self,
        key: &str,
        payload: A::Payload,
    ) -> Result<A::Output, WaitError> {
        let submission = self.submit(key, payload)?;
        Ok(submission.handle.await?)
    }

    /// Tasks in `key`'s lane right now (running one included).
    pub fn pending_count(&self, key: &str) -> usize {
        NamespaceKey::parse(key).map_or(0, |key| self.inner.registry.pending_count(&key))
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let registry = &self.inner.registry;
        QueueSnapshot {
            accepting: registry.is_accepting(),
            active_workers: registry.workers().current(),
            lanes: registry.statuses(),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.registry.is_accepting()
    }

    /// Remove an idle, empty lane from the registry.
    pub fn retire(&self, key: &str) -> bool {
        NamespaceKey::parse(key).is_ok_and(|key| self.inner.registry.retire(&key))
    }

    /// Stop accepting work and wind down every lane, giving up at `deadline`.
    pub async fn shutdown(&self, mode: ShutdownMode, deadline: Duration) -> ShutdownReport {
        shutdown::coordinate(&self.inner.registry, mode, deadline).await
    }
}
