//! Callback - ネイティブ層に渡すコールバック参照
//!
//! ネイティブライブラリは自分のスレッドから、渡された handle と
//! status / payload を付けてこれを呼ぶ。呼ばれると registry から handle を
//! 取り出し、呼び出し側の future を完了させる。ブロックはしない。

use std::marker::PhantomData;
use std::sync::Arc;

use super::context::ContextInner;
use crate::domain::{
    CommandHandle, RawStatus, TetherError, complete_or_fail, fail_with_status, translate,
};

/// Typed completion entry point for one kind of native operation.
///
/// Cheap to clone and `Send + Sync` whatever `T` is; the payload only moves
/// through it.
pub struct Callback<T> {
    inner: Arc<ContextInner>,
    _payload: PhantomData<fn(T)>,
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("session", &self.inner.session)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Send + 'static> Callback<T> {
    pub(crate) fn new(inner: Arc<ContextInner>) -> Self {
        Self {
            inner,
            _payload: PhantomData,
        }
    }

    /// Deliver the result of the command identified by `handle`.
    pub fn complete(&self, handle: CommandHandle, status: RawStatus, payload: T) -> Result<(), TetherError> {
        self.complete_with_detail(handle, status, payload, None)
    }

    /// Like [`complete`](Self::complete), with a diagnostic message attached
    /// to the error when `status` is a failure.
    pub fn complete_with_detail(
        &self,
        handle: CommandHandle,
        status: RawStatus,
        payload: T,
        detail: Option<String>,
    ) -> Result<(), TetherError> {
        let operation = self.inner.resolve(handle)?;
        tracing::debug!(
            session = %self.inner.session,
            %handle,
            operation = operation.operation(),
            status,
            kind = %translate(status),
            "callback delivered"
        );
        complete_or_fail(operation, status, payload, detail).map_err(|e| self.inner.violation(e))
    }

    /// Deliver a failure for which the native layer has no payload.
    pub fn fail(&self, handle: CommandHandle, status: RawStatus, detail: Option<String>) -> Result<(), TetherError> {
        let operation = self.inner.resolve(handle)?;
        tracing::debug!(
            session = %self.inner.session,
            %handle,
            operation = operation.operation(),
            status,
            "callback delivered failure"
        );
        fail_with_status(operation, status, detail);
        Ok(())
    }
}
