//! Errors - エラー型と分類
//!
//! # 分類
//! - **SubmitError**: 受付時に同期的に返す拒否（shutdown 中、キー不正、lane 満杯）
//! - **TaskError**: completion handle 経由で返すタスク単位の失敗
//! - **ApplyError**: 外部の apply capability が返した失敗そのもの
//!
//! タスクの失敗は lane 全体を止めません。影響はそのタスクの handle だけです。

use thiserror::Error;

use super::key::NamespaceKey;

/// Namespace key validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("namespace key must not be empty")]
    Empty,

    #[error("namespace key is {len} bytes, max is {max}")]
    TooLong { len: usize, max: usize },

    #[error("namespace key must not contain control characters")]
    ControlCharacter,
}

/// Rejected at submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("queue is shutting down; submission rejected")]
    ShuttingDown,

    #[error("invalid namespace key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("lane for key={key} is full (limit={limit})")]
    LaneFull { key: NamespaceKey, limit: usize },
}

/// Failure reported by the apply capability for one task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApplyError {
    message: String,
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// How a single task ended when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The apply capability returned a failure (or panicked).
    #[error("apply failed: {0}")]
    Failed(#[from] ApplyError),

    /// Discarded by shutdown before the task started.
    #[error("cancelled: shutdown")]
    Cancelled,

    /// Abandoned because the shutdown deadline elapsed.
    #[error("timed out: abandoned at shutdown deadline")]
    TimedOut,

    /// The completion was dropped without a result. Never expected.
    #[error("task lost: completion dropped without a result")]
    Lost,
}

impl TaskError {
    /// Did shutdown end this task (as opposed to the work itself failing)?
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TaskError::Cancelled | TaskError::TimedOut)
    }
}

/// Error of the synchronous flavour (`submit_and_wait`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error(transparent)]
    Rejected(#[from] SubmitError),

    #[error(transparent)]
    Task(#[from] TaskError),
}
