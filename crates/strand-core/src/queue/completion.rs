//! Completion handle: a single-resolution future for one task's result.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::domain::{TaskError, TaskId};

/// Resolver side. Consumed by `resolve`, so a task can only be resolved once.
#[derive(Debug)]
pub(crate) struct Resolver<T> {
    tx: oneshot::Sender<Result<T, TaskError>>,
}

impl<T> Resolver<T> {
    /// Returns `false` when the submitter already dropped its handle.
    pub(crate) fn resolve(self, result: Result<T, TaskError>) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Awaitable result of one submitted task.
///
/// Dropping the handle is fine (fire-and-forget); the task still runs.
/// If the queue drops the task without resolving it, the handle yields
/// [`TaskError::Lost`].
#[derive(Debug)]
pub struct CompletionHandle<T> {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> CompletionHandle<T> {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Non-blocking check. `None` while the task has not been resolved yet.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Lost)),
        }
    }
}

impl<T> Future for CompletionHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Lost)))
    }
}

pub(crate) fn completion<T>(task_id: TaskId) -> (Resolver<T>, CompletionHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, CompletionHandle { task_id, rx })
}
