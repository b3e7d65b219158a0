//! Ports - 抽象化レイヤー
//!
//! 外部システム（graph バックエンド、時刻、ID 採番）へのインターフェースです。
//! 実装は `impls` と、テストでは各モジュールの fake が提供します。

pub mod apply;
pub mod clock;
pub mod id_generator;

pub use self::apply::ApplyEpisode;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
