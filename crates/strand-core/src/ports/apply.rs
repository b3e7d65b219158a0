//! ApplyEpisode port - 外部の graph 処理バックエンド
//!
//! キューが外部から消費する唯一の capability です。
//! 1 件の payload を受け取り、グラフを更新して結果か失敗を返します（秒単位で遅いことがある）。
//!
//! # 設計原則
//! - キー単位の直列化はキュー側が保証する（同じキーで同時に呼ばれることはない）
//! - キーをまたぐ同時実行数の上限はバックエンド側の関心事
//!   （`impls::ConcurrencyLimited` で後付けできる）

use async_trait::async_trait;

use crate::domain::{ApplyError, NamespaceKey};

/// The graph-processing capability, applied to one task at a time per key.
///
/// The key is passed alongside the payload so the backend can scope its
/// writes to the group.
#[async_trait]
pub trait ApplyEpisode: Send + Sync + 'static {
    type Payload: Send + 'static;
    type Output: Send + 'static;

    async fn apply(
        &self,
        key: &NamespaceKey,
        payload: Self::Payload,
    ) -> Result<Self::Output, ApplyError>;
}
