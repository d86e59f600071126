//! App - domain と ports を組み合わせた相関サービス
//!
//! # 主要コンポーネント
//! - **CommandContext**: issue / call_sync / check_result
//! - **Callback**: ネイティブ層がコマンドを完了させるときに呼ぶ入口
//! - **PendingOperationRegistry**: handle テーブル
//! - **ContextBuilder** + **Settings**: 構築と設定

pub mod builder;
pub mod callback;
pub mod context;
pub mod registry;
pub mod settings;

pub use self::builder::{BuildError, ContextBuilder};
pub use self::callback::Callback;
pub use self::context::CommandContext;
pub use self::registry::PendingOperationRegistry;
pub use self::settings::{Settings, SettingsError, ViolationPolicy};
