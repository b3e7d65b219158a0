//! DispatcherBuilder - Dispatcher の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定の不正やランタイム外での構築は
//!   `build()` の時点でエラーにする

use std::sync::Arc;

use tokio::runtime::Handle;

use super::dispatcher::{Dispatcher, DispatcherParts};
use crate::config::{ConfigError, QueueConfig};
use crate::ports::{ApplyEpisode, Clock, IdGenerator, SystemClock, UlidGenerator};

/// DispatcherBuilder は Dispatcher を構築
///
/// # 使用例
/// ```ignore
/// let dispatcher = Dispatcher::builder(graph)
///     .config(QueueConfig::from_env()?)
///     .build()?;
/// ```
pub struct DispatcherBuilder<A: ApplyEpisode> {
    apply: A,
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    runtime: Option<Handle>,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no tokio runtime: build inside a runtime or pass one with `runtime()`")]
    NoRuntime,
}

impl<A: ApplyEpisode> DispatcherBuilder<A> {
    pub fn new(apply: A) -> Self {
        Self {
            apply,
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// 受付時刻の時計を差し替え（テスト用）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// worker を spawn するランタイム。省略時は現在のランタイム
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 設定を検証して Dispatcher を生成
    ///
    /// # 検証
    /// - `QueueConfig::validate()` が通ること
    /// - ランタイムが指定されているか、ランタイム内で呼ばれていること
    pub fn build(self) -> Result<Dispatcher<A>, BuildError> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.ids.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>
        });

        Ok(Dispatcher::from_parts(DispatcherParts {
            apply: Arc::new(self.apply),
            clock,
            ids,
            runtime,
            max_pending_per_lane: self.config.max_pending_per_lane,
            retire_idle_lanes: self.config.retire_idle_lanes,
        }))
    }
}
