//! Identifiers: command handles と session ids
//!
//! # CommandHandle
//! ネイティブ ABI は相関 ID を素の `u32` で運ぶので、handle はその透過的な newtype。
//! [`HandleAllocator`](crate::ports::HandleAllocator) が発行し、再利用はしない。
//!
//! # SessionId
//! [`CommandContext`](crate::app::CommandContext) 1つにつき ULID ベースの ID を1つ。
//! ログ上で複数コンテキストの出力を見分けるためだけに使う。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::ports::Clock;

/// Correlation id linking a native request to its eventual callback.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandHandle(u32);

impl CommandHandle {
    /// Wrap a raw handle received from the native layer.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The value passed across the native boundary.
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl From<CommandHandle> for u32 {
    fn from(handle: CommandHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Identifier of one command context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a session id whose timestamp part comes from `clock`.
    pub fn generate(clock: &dyn Clock) -> Self {
        let timestamp_ms = clock.now().timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}
