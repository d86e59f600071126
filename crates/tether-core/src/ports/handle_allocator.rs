//! HandleAllocator port - command handle の生成
//!
//! # SequentialAllocator
//! - `AtomicU32` 1つ、lock なし
//! - 最初の handle は 1（設定で変更可）
//! - `u32` の範囲を使い切ったら即失敗。wrap しないので、遅れて届いた
//!   コールバックが新しいコマンドに誤って対応付けられることはない

use std::sync::atomic::{AtomicU32, Ordering};

use crate::domain::{CommandHandle, TetherError};

/// Issues command handles.
///
/// # Thread Safety
/// - `Send + Sync` is required: handles are allocated from any caller thread.
pub trait HandleAllocator: Send + Sync {
    /// A handle distinct from every handle previously returned.
    fn next(&self) -> Result<CommandHandle, TetherError>;
}

/// Monotonic counter-backed allocator.
#[derive(Debug)]
pub struct SequentialAllocator {
    /// The next handle to hand out. Zero is never issued and marks exhaustion.
    next: AtomicU32,
}

impl SequentialAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start issuing at `first`. Zero is reserved and bumped to 1.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first.max(1)),
        }
    }
}

impl Default for SequentialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator for SequentialAllocator {
    fn next(&self) -> Result<CommandHandle, TetherError> {
        // issuing u32::MAX wraps the counter to zero, which sticks
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (current != 0).then(|| current.wrapping_add(1))
            })
            .map(CommandHandle::from_raw)
            .map_err(|_| TetherError::HandleSpaceExhausted)
    }
}
