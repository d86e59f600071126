//! PendingOperationRegistry - handle -> 実行中オペレーション
//!
//! # 実装詳細
//! - 登録は呼び出し側スレッド、解決はネイティブのコールバックスレッドから、
//!   並行かつ任意の順序で行われる
//! - テーブルは shard に分割（各 shard が `Mutex<HashMap>`）。lock を持つのは
//!   insert / remove の間だけで、future の完了はエントリを取り出した後
//! - 各エントリはちょうど1回だけ出ていく。存在しない handle の解決は
//!   protocol violation（黙って無視しない）

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{CommandHandle, PendingOperation, PendingSummary, ProtocolViolation, TetherError};

pub const DEFAULT_SHARDS: usize = 16;

type Shard = Mutex<HashMap<CommandHandle, PendingOperation>>;

pub struct PendingOperationRegistry {
    shards: Box<[Shard]>,
}

impl PendingOperationRegistry {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// `shards` is clamped to at least one.
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard(&self, handle: CommandHandle) -> MutexGuard<'_, HashMap<CommandHandle, PendingOperation>> {
        let index = handle.as_raw() as usize % self.shards.len();
        // entries are plain data; a panic elsewhere cannot leave a map half-updated
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `operation` under `handle`.
    ///
    /// A duplicate handle leaves the existing entry untouched; the rejected
    /// operation is failed with the same violation.
    pub fn register(&self, handle: CommandHandle, operation: PendingOperation) -> Result<(), TetherError> {
        {
            let mut shard = self.shard(handle);
            if let Entry::Vacant(slot) = shard.entry(handle) {
                slot.insert(operation);
                return Ok(());
            }
        }
        let violation = ProtocolViolation::DuplicateHandle(handle);
        operation.fail(violation.clone().into());
        Err(violation.into())
    }

    /// Remove and return the operation for `handle`.
    pub fn resolve(&self, handle: CommandHandle) -> Result<PendingOperation, TetherError> {
        self.shard(handle)
            .remove(&handle)
            .ok_or_else(|| ProtocolViolation::UnknownHandle(handle).into())
    }

    pub fn contains(&self, handle: CommandHandle) -> bool {
        self.shard(handle).contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every outstanding entry, ordered by handle.
    ///
    /// Shards are visited one at a time, so entries registered or resolved
    /// during the walk may or may not appear.
    pub fn outstanding(&self) -> Vec<PendingSummary> {
        let mut summaries: Vec<PendingSummary> = self
            .shards
            .iter()
            .flat_map(|s| {
                s.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .map(PendingOperation::summary)
                    .collect::<Vec<_>>()
            })
            .collect();
        summaries.sort_by_key(|s| s.handle);
        summaries
    }
}

impl Default for PendingOperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingOperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperationRegistry")
            .field("shards", &self.shards.len())
            .field("pending", &self.len())
            .finish()
    }
}
