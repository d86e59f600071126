//! tether-core
//!
//! Callback-driven native interface と async な呼び出し側をつなぐ相関レイヤー。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status/ErrorKind, errors, params, pending, structural）
//! - **ports**: 抽象化レイヤー（HandleAllocator, Clock）
//! - **app**: アプリケーションロジック（CommandContext, Callback, registry, settings, builder）
//! - **impls**: 実装（LoopbackNative: テスト・デモ用の擬似ネイティブライブラリ）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Callback, CommandContext, ContextBuilder, Settings};
pub use domain::{CommandHandle, ErrorKind, JsonParameterSet, ParamValue, PendingResult, TetherError};
