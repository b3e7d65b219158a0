//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ConcurrencyLimited**: 任意の apply を包んで、key をまたいだ同時実行数を制限
//! - **SimulatedGraph**: メモリ上のグラフ backend（開発用・CLI 用）
//!
//! 本物のグラフ DB 向けの apply 実装は別クレートに置く想定です。

pub mod limited;
pub mod simulated;

pub use self::limited::ConcurrencyLimited;
pub use self::simulated::{AppliedEpisode, SimulatedGraph};
