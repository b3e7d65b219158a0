//! WorkerLoop - lane を空になるまで順番に処理するループ
//!
//! # フロー
//! 1. lane の先頭から payload を取り出す（レコードは先頭に残す）
//! 2. apply を別タスクで実行し、abort handle を lane に登録する
//! 3. 結果で先頭を pop して completion を解決する（同じロック区間）
//! 4. lane が空なら registry ロック下で Idle に戻して終了
//!
//! apply の失敗はそのタスクの completion に返すだけで、ループは続行します。
//! apply を別タスクで動かすのは、panic を 1 タスクの失敗として扱うためと、
//! shutdown の期限切れで呼び出しを打ち切れるようにするためです。

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::domain::{ApplyError, TaskError, TaskId};
use crate::ports::ApplyEpisode;
use crate::queue::{KeyLane, LaneRegistry, Next, Release, WorkerTicket};

type Lane<A> = KeyLane<<A as ApplyEpisode>::Payload, <A as ApplyEpisode>::Output>;
type Registry<A> = LaneRegistry<<A as ApplyEpisode>::Payload, <A as ApplyEpisode>::Output>;

/// Exclusive drainer of one lane.
pub(crate) struct WorkerLoop<A: ApplyEpisode> {
    generation: u64,
    lane: Arc<Lane<A>>,
    registry: Arc<Registry<A>>,
    apply: Arc<A>,
    retire_idle: bool,
    _ticket: WorkerTicket,
}

impl<A: ApplyEpisode> WorkerLoop<A> {
    pub(crate) fn new(
        generation: u64,
        lane: Arc<Lane<A>>,
        registry: Arc<Registry<A>>,
        apply: Arc<A>,
        retire_idle: bool,
        ticket: WorkerTicket,
    ) -> Self {
        Self {
            generation,
            lane,
            registry,
            apply,
            retire_idle,
            _ticket: ticket,
        }
    }

    pub(crate) async fn run(self) {
        let key = self.lane.key().clone();
        info!(key = %key, worker = self.generation, "lane worker started");

        let mut processed = 0u64;
        loop {
            let next = self.lane.lock().next();
            match next {
                Next::Run {
                    task_id,
                    seq,
                    payload,
                } => {
                    debug!(key = %key, %task_id, seq, "processing queued task");
                    let result = self.apply_one(task_id, payload).await;
                    if let Err(err) = &result {
                        error!(key = %key, %task_id, error = %err, "queued task failed");
                    } else {
                        debug!(key = %key, %task_id, "queued task applied");
                    }
                    processed += 1;

                    if !self.lane.lock().finish(task_id, result) {
                        // shutdown resolved the task and closed the lane
                        self.lane.lock().release();
                        break;
                    }
                }
                Next::Empty => match self.registry.release_if_empty(&self.lane, self.retire_idle) {
                    Release::Continue => continue,
                    Release::Parked { retired } => {
                        info!(
                            key = %key,
                            worker = self.generation,
                            processed,
                            retired,
                            "lane drained; worker exiting"
                        );
                        break;
                    }
                },
                Next::Closed => {
                    self.lane.lock().release();
                    debug!(key = %key, worker = self.generation, "lane closed; worker exiting");
                    break;
                }
            }
        }
    }

    async fn apply_one(&self, task_id: TaskId, payload: A::Payload) -> Result<A::Output, TaskError> {
        let apply = Arc::clone(&self.apply);
        let key = self.lane.key().clone();
        let join = tokio::spawn(async move { apply.apply(&key, payload).await });

        if !self.lane.lock().track_in_flight(task_id, join.abort_handle()) {
            return Err(TaskError::TimedOut);
        }

        match join.await {
            Ok(result) => result.map_err(TaskError::Failed),
            Err(join_err) if join_err.is_panic() => {
                Err(TaskError::Failed(ApplyError::new("apply panicked")))
            }
            // aborted at the shutdown deadline
            Err(_) => Err(TaskError::TimedOut),
        }
    }
}
