//! PendingOperation / PendingResult - 実行中コマンドの2つの端
//!
//! `PendingOperation` は producer 側。登録から解決まで registry が持ち、
//! `complete` / `fail` で消費されてちょうど1回だけ完了する。
//! `PendingResult<T>` は呼び出し側が await する consumer 側。
//!
//! # 学習ポイント
//! - 型消去: 複数の payload 型を1つのテーブルに入れるため、`oneshot::Sender` を
//!   object-safe な `Slot` trait の裏に隠す
//! - payload 付きの完了では登録時の `TypeId` を先に確認し、不一致でも
//!   呼び出し側の future は必ず失敗として完了させる

use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::errors::{ProtocolViolation, TetherError};
use super::ids::CommandHandle;
use super::structural::PendingSummary;

type Outcome<T> = Result<T, TetherError>;

trait Slot: Send {
    fn fail(self: Box<Self>, error: TetherError);
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

struct TypedSlot<T> {
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T: Send + 'static> TypedSlot<T> {
    fn send(self, outcome: Outcome<T>) {
        // the receiver is gone when the caller stopped waiting; nothing to do
        if self.tx.send(outcome).is_err() {
            tracing::debug!("pending result dropped before completion");
        }
    }
}

impl<T: Send + 'static> Slot for TypedSlot<T> {
    fn fail(self: Box<Self>, error: TetherError) {
        self.send(Err(error));
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A registered, not yet completed operation.
pub struct PendingOperation {
    handle: CommandHandle,
    operation: &'static str,
    payload_type: TypeId,
    payload_type_name: &'static str,
    registered_at: DateTime<Utc>,
    slot: Box<dyn Slot>,
}

impl PendingOperation {
    /// Create an operation and the future that observes it.
    pub fn new<T: Send + 'static>(
        handle: CommandHandle,
        operation: &'static str,
        registered_at: DateTime<Utc>,
    ) -> (Self, PendingResult<T>) {
        let (tx, rx) = oneshot::channel();
        let op = Self {
            handle,
            operation,
            payload_type: TypeId::of::<T>(),
            payload_type_name: std::any::type_name::<T>(),
            registered_at,
            slot: Box::new(TypedSlot { tx }),
        };
        (op, PendingResult { handle, rx })
    }

    pub fn handle(&self) -> CommandHandle {
        self.handle
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn summary(&self) -> PendingSummary {
        PendingSummary {
            handle: self.handle,
            operation: self.operation,
            payload_type: self.payload_type_name,
            registered_at: self.registered_at,
        }
    }

    /// Deliver the terminal state.
    ///
    /// Fails with `PayloadTypeMismatch` if `T` is not the type the operation
    /// was created with; the caller's future then receives the same violation.
    pub fn complete<T: Send + 'static>(self, outcome: Outcome<T>) -> Result<(), TetherError> {
        if self.payload_type != TypeId::of::<T>() {
            let violation = ProtocolViolation::PayloadTypeMismatch {
                handle: self.handle,
                registered: self.payload_type_name,
                delivered: std::any::type_name::<T>(),
            };
            self.slot.fail(violation.clone().into());
            return Err(violation.into());
        }

        match self.slot.into_any().downcast::<TypedSlot<T>>() {
            Ok(slot) => {
                slot.send(outcome);
                Ok(())
            }
            // unreachable after the TypeId check, but the slot is gone either way
            Err(_) => Err(ProtocolViolation::PayloadTypeMismatch {
                handle: self.handle,
                registered: self.payload_type_name,
                delivered: std::any::type_name::<T>(),
            }
            .into()),
        }
    }

    /// Fail the operation regardless of its payload type.
    pub fn fail(self, error: TetherError) {
        self.slot.fail(error);
    }
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("handle", &self.handle)
            .field("operation", &self.operation)
            .field("payload_type", &self.payload_type_name)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// The caller's view of an issued command.
///
/// Resolves to the payload on success. If the operation is dropped without
/// being completed (e.g. its context was torn down) the result is
/// [`TetherError::Abandoned`].
#[derive(Debug)]
#[must_use = "a pending result does nothing unless awaited"]
pub struct PendingResult<T> {
    handle: CommandHandle,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> PendingResult<T> {
    /// A result that is already failed, for commands that never got registered.
    pub(crate) fn failed(handle: CommandHandle, error: TetherError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { handle, rx }
    }

    pub fn handle(&self) -> CommandHandle {
        self.handle
    }

    /// Block the current thread until the command completes.
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait_blocking(self) -> Outcome<T> {
        let handle = self.handle;
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TetherError::Abandoned(handle)))
    }
}

impl<T> Future for PendingResult<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let handle = self.handle;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TetherError::Abandoned(handle))))
    }
}
