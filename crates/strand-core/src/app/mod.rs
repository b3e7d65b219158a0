//! App - アプリケーション層
//!
//! queue の lane と ports の apply 能力を組み合わせて、キューの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **Dispatcher**: 受付（submit）、状態照会、shutdown の入口
//! - **DispatcherBuilder**: 設定の検証とワイヤリング
//! - **WorkerLoop**: 1 lane を空になるまで順番に処理するループ
//! - **shutdown**: 受付停止 → 排出 or 破棄 → 期限で打ち切り

pub mod builder;
pub mod dispatcher;
pub mod shutdown;
pub mod status;
mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::dispatcher::{Dispatcher, Submission};
pub use self::shutdown::{ShutdownMode, ShutdownReport};
pub use self::status::{LaneStatus, QueueSnapshot};
