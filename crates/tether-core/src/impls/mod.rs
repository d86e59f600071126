//! Impls - 開発・テスト用のインプロセス実装
//!
//! - **LoopbackNative**: 自前のコールバックスレッドを持つ擬似ネイティブライブラリ

pub mod loopback;

pub use self::loopback::{LoopbackNative, Reply};
