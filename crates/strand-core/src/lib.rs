//! strand-core
//!
//! Per-key sequential processing queue for episodes.
//!
//! 同じ key（group id）に投入された episode は受付順に 1 件ずつ処理し、
//! 異なる key どうしは並行に処理します。投入側は待たずに受付位置を受け取り、
//! 必要なら completion handle で結果を待てます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, key, episode, errors）
//! - **ports**: 抽象化レイヤー（ApplyEpisode, Clock, IdGenerator）
//! - **queue**: lane と registry（状態はすべてここに閉じ込める）
//! - **app**: Dispatcher, DispatcherBuilder, worker loop, shutdown, status
//! - **impls**: ports の実装（ConcurrencyLimited, SimulatedGraph）
//! - **config**: QueueConfig（TOML + 環境変数）
//!
//! # 使用例
//! ```ignore
//! let dispatcher = Dispatcher::builder(SimulatedGraph::new(latency)).build()?;
//! let submission = dispatcher.submit("group-1", episode)?;
//! println!("{}", submission.accepted_message("standup"));
//! let report = dispatcher.shutdown(ShutdownMode::Drain, deadline).await;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{
    BuildError, Dispatcher, DispatcherBuilder, QueueSnapshot, ShutdownMode, ShutdownReport,
    Submission,
};
pub use config::{ConfigError, QueueConfig};
pub use domain::{
    ApplyError, Episode, EpisodeRequest, EpisodeSource, NamespaceKey, SubmitError, TaskError,
    TaskId, WaitError,
};
pub use ports::ApplyEpisode;
pub use queue::CompletionHandle;
