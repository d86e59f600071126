//! ContextBuilder - CommandContext の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定の誤りは最初のコマンドではなく `build()` で報告
//! - port（HandleAllocator, Clock）の差し替え

use super::context::CommandContext;
use super::settings::{Settings, SettingsError};
use crate::ports::{Clock, HandleAllocator, SequentialAllocator, SystemClock};

/// Builds a [`CommandContext`].
///
/// # Example
/// ```
/// use tether_core::app::{ContextBuilder, Settings};
///
/// let ctx = ContextBuilder::new()
///     .settings(Settings::default())
///     .build()
///     .unwrap();
/// assert_eq!(ctx.pending_count(), 0);
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    settings: Settings,
    allocator: Option<Box<dyn HandleAllocator>>,
    clock: Option<Box<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default sequential allocator. `first_handle` is then ignored.
    pub fn allocator(mut self, allocator: impl HandleAllocator + 'static) -> Self {
        self.allocator = Some(Box::new(allocator));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn build(self) -> Result<CommandContext, BuildError> {
        self.settings.validate()?;

        let allocator = self
            .allocator
            .unwrap_or_else(|| Box::new(SequentialAllocator::starting_at(self.settings.first_handle)));
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        Ok(CommandContext::from_parts(&self.settings, allocator, clock))
    }
}
