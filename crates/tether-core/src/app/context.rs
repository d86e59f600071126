//! CommandContext - allocator と registry を1つずつ持つサービスオブジェクト
//!
//! プロセス全体の状態は持たない。プロセス（またはクライアントセッション）ごとに
//! [`ContextBuilder`](super::builder::ContextBuilder) で1つ作り、clone して配る。
//! clone 同士は同じテーブルを共有する。
//!
//! # 使用例
//! ```ignore
//! let result: PendingResult<String> = ctx.issue("connection_create", |handle, cb| {
//!     native.connection_create(handle, cb, &params.to_json())
//! });
//! let payload = result.await?;
//! ```
//!
//! クロージャがネイティブの入口。割り当てた handle と型付きの [`Callback`] を
//! 受け取り、即時 status を返す。登録はクロージャ実行前に済んでいるので、
//! return 前にコールバックしてくるネイティブ層でも問題ない。

use std::sync::Arc;

use super::callback::Callback;
use super::registry::PendingOperationRegistry;
use super::settings::{Settings, ViolationPolicy};
use crate::domain::{
    CommandHandle, PendingOperation, PendingResult, PendingSummary, RawStatus, SessionId,
    TetherError, check_result, is_success, translate,
};
use crate::ports::{Clock, HandleAllocator, SequentialAllocator, SystemClock};

pub(crate) struct ContextInner {
    pub(crate) session: SessionId,
    session_name: String,
    allocator: Box<dyn HandleAllocator>,
    registry: PendingOperationRegistry,
    clock: Box<dyn Clock>,
    policy: ViolationPolicy,
}

impl ContextInner {
    /// Log a protocol violation and apply the configured policy.
    pub(crate) fn violation(&self, error: TetherError) -> TetherError {
        tracing::error!(
            session = %self.session,
            error = %error,
            "protocol violation in command correlation"
        );
        if self.policy == ViolationPolicy::Panic {
            panic!("{} ({}): {error}", self.session_name, self.session);
        }
        error
    }

    pub(crate) fn resolve(&self, handle: CommandHandle) -> Result<PendingOperation, TetherError> {
        self.registry.resolve(handle).map_err(|e| self.violation(e))
    }
}

/// Entry point for issuing native commands.
#[derive(Clone)]
pub struct CommandContext {
    inner: Arc<ContextInner>,
}

impl CommandContext {
    /// A context with default settings and the system clock.
    pub fn new() -> Self {
        let settings = Settings::default();
        Self::from_parts(
            &settings,
            Box::new(SequentialAllocator::starting_at(settings.first_handle)),
            Box::new(SystemClock),
        )
    }

    pub(crate) fn from_parts(
        settings: &Settings,
        allocator: Box<dyn HandleAllocator>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let session = SessionId::generate(clock.as_ref());
        tracing::debug!(%session, name = %settings.session_name, "command context created");
        Self {
            inner: Arc::new(ContextInner {
                session,
                session_name: settings.session_name.clone(),
                allocator,
                registry: PendingOperationRegistry::with_shards(settings.registry_shards),
                clock,
                policy: settings.on_protocol_violation,
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session
    }

    pub fn session_name(&self) -> &str {
        &self.inner.session_name
    }

    /// Start a native command and return the future of its result.
    ///
    /// A non-success immediate status fails the future right away with
    /// [`TetherError::NativeCall`] and removes the handle from the table.
    pub fn issue<T, F>(&self, operation: &'static str, call: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(CommandHandle, Callback<T>) -> RawStatus,
    {
        let inner = &self.inner;
        let handle = match inner.allocator.next() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(session = %inner.session, operation, error = %err, "cannot allocate handle");
                return PendingResult::failed(CommandHandle::from_raw(0), err);
            }
        };

        let (pending, result) = PendingOperation::new::<T>(handle, operation, inner.clock.now());
        if let Err(err) = inner.registry.register(handle, pending) {
            // the registry already failed `result` with the violation
            inner.violation(err);
            return result;
        }
        tracing::debug!(session = %inner.session, %handle, operation, "command registered");

        let status = call(handle, Callback::new(Arc::clone(inner)));
        if !is_success(status) {
            let kind = translate(status);
            tracing::warn!(session = %inner.session, %handle, operation, status, %kind, "native call rejected");
            match inner.registry.resolve(handle) {
                Ok(pending) => pending.fail(TetherError::NativeCall {
                    operation,
                    kind,
                    code: status,
                }),
                // the native layer both rejected and called back
                Err(err) => {
                    inner.violation(err);
                }
            }
        }
        result
    }

    /// Blocking variant of [`issue`](Self::issue).
    ///
    /// Waits on the current thread for the callback. Must not be called from
    /// inside an async runtime worker.
    pub fn call_sync<T, F>(&self, operation: &'static str, call: F) -> Result<T, TetherError>
    where
        T: Send + 'static,
        F: FnOnce(CommandHandle, Callback<T>) -> RawStatus,
    {
        self.issue(operation, call).wait_blocking()
    }

    /// For native entry points that complete synchronously, with no callback.
    pub fn check_result(&self, operation: &'static str, status: RawStatus) -> Result<(), TetherError> {
        check_result(operation, status).inspect_err(|err| {
            tracing::warn!(session = %self.inner.session, operation, status, error = %err, "native call failed");
        })
    }

    /// Commands still waiting for a callback, ordered by handle.
    pub fn outstanding(&self) -> Vec<PendingSummary> {
        self.inner.registry.outstanding()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("session", &self.inner.session)
            .field("name", &self.inner.session_name)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::ContextBuilder;
    use crate::domain::{ErrorKind, ProtocolViolation, SUCCESS_CODE};
    use rand::Rng;
    use rand::seq::SliceRandom;
    use std::sync::Mutex;

    fn reporting_context() -> CommandContext {
        let settings = Settings {
            on_protocol_violation: ViolationPolicy::Report,
            ..Settings::default()
        };
        ContextBuilder::new().settings(settings).build().unwrap()
    }

    /// Stashes callbacks so tests can deliver them whenever they like.
    type Stash<T> = Arc<Mutex<Vec<(CommandHandle, Callback<T>)>>>;

    fn stash<T>() -> Stash<T> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn success_callback_resolves_future() {
        let ctx = CommandContext::new();
        let calls = stash::<String>();

        let result = ctx.issue("echo", |handle, cb| {
            calls.lock().unwrap().push((handle, cb));
            SUCCESS_CODE
        });
        assert_eq!(ctx.pending_count(), 1);

        let (handle, cb) = calls.lock().unwrap().pop().unwrap();
        assert_eq!(handle, result.handle());
        cb.complete(handle, SUCCESS_CODE, "pong".to_string()).unwrap();

        assert_eq!(result.await.unwrap(), "pong");
        assert_eq!(ctx.pending_count(), 0);
    }

    #[tokio::test]
    async fn failure_callback_fails_future_with_kind() {
        let ctx = CommandContext::new();
        let calls = stash::<String>();

        let result = ctx.issue("connect", |handle, cb| {
            calls.lock().unwrap().push((handle, cb));
            SUCCESS_CODE
        });
        let (handle, cb) = calls.lock().unwrap().pop().unwrap();
        cb.complete_with_detail(handle, 1002, String::new(), Some("timeout".into()))
            .unwrap();

        let err = result.await.unwrap_err();
        assert!(matches!(
            err,
            TetherError::AsyncOperation { operation: "connect", kind: ErrorKind::Connection, code: 1002, .. }
        ));
    }

    #[tokio::test]
    async fn immediate_rejection_fails_and_deregisters() {
        let ctx = CommandContext::new();
        let result: PendingResult<String> = ctx.issue("create", |_handle, _cb| 1007);

        assert_eq!(ctx.pending_count(), 0);
        let err = result.await.unwrap_err();
        assert!(matches!(
            err,
            TetherError::NativeCall { operation: "create", kind: ErrorKind::InvalidOption, code: 1007 }
        ));
    }

    #[tokio::test]
    async fn synchronous_callback_before_return_is_fine() {
        let ctx = CommandContext::new();
        let result = ctx.issue("inline", |handle, cb: Callback<u32>| {
            cb.complete(handle, SUCCESS_CODE, 7).unwrap();
            SUCCESS_CODE
        });
        assert_eq!(result.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn handles_increase_across_issues() {
        let ctx = CommandContext::new();
        let a: PendingResult<()> = ctx.issue("a", |_, _| 1001);
        let b: PendingResult<()> = ctx.issue("b", |_, _| 1001);
        assert_eq!(a.handle().as_raw(), 1);
        assert_eq!(b.handle().as_raw(), 2);
    }

    #[tokio::test]
    async fn unknown_handle_is_reported_under_report_policy() {
        let ctx = reporting_context();
        let calls = stash::<()>();
        let result = ctx.issue("op", |handle, cb| {
            calls.lock().unwrap().push((handle, cb));
            SUCCESS_CODE
        });
        let (handle, cb) = calls.lock().unwrap().pop().unwrap();

        cb.complete(handle, SUCCESS_CODE, ()).unwrap();
        result.await.unwrap();

        // second delivery for the same handle
        let err = cb.complete(handle, SUCCESS_CODE, ()).unwrap_err();
        assert!(matches!(
            err,
            TetherError::ProtocolViolation(ProtocolViolation::UnknownHandle(h)) if h == handle
        ));

        let err = cb.fail(CommandHandle::from_raw(999), 1001, None).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    #[should_panic(expected = "protocol violation")]
    fn unknown_handle_panics_under_default_policy() {
        let ctx = CommandContext::new();
        let calls = stash::<()>();
        let _result = ctx.issue("op", |handle, cb| {
            calls.lock().unwrap().push((handle, cb));
            SUCCESS_CODE
        });
        let (_, cb) = calls.lock().unwrap().pop().unwrap();
        let _ = cb.complete(CommandHandle::from_raw(12345), SUCCESS_CODE, ());
    }

    #[tokio::test]
    async fn callback_before_rejection_keeps_callback_result_when_reporting() {
        let ctx = reporting_context();
        let result = ctx.issue("confused", |handle, cb: Callback<u8>| {
            cb.complete(handle, SUCCESS_CODE, 1).unwrap();
            1001
        });
        // the callback won; the late rejection only got logged
        assert_eq!(result.await.unwrap(), 1);
        assert_eq!(ctx.pending_count(), 0);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn rejection_after_callback_panics_under_default_policy() {
        let ctx = CommandContext::new();
        let _result = ctx.issue("confused", |handle, cb: Callback<u8>| {
            cb.complete(handle, SUCCESS_CODE, 1).unwrap();
            1001
        });
    }

    #[tokio::test]
    async fn fail_without_payload() {
        let ctx = CommandContext::new();
        let calls = stash::<Vec<u8>>();
        let result = ctx.issue("fetch", |handle, cb| {
            calls.lock().unwrap().push((handle, cb));
            SUCCESS_CODE
        });
        let (handle, cb) = calls.lock().unwrap().pop().unwrap();
        cb.fail(handle, 1016, Some("bad json".into())).unwrap();

        let err = result.await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidJson));
    }

    #[tokio::test]
    async fn outstanding_lists_unresolved_commands() {
        let ctx = CommandContext::new();
        let calls = stash::<()>();
        let _a = ctx.issue("first", |h, cb| {
            calls.lock().unwrap().push((h, cb));
            SUCCESS_CODE
        });
        let _b = ctx.issue("second", |h, cb| {
            calls.lock().unwrap().push((h, cb));
            SUCCESS_CODE
        });

        let outstanding = ctx.outstanding();
        let ops: Vec<&str> = outstanding.iter().map(|s| s.operation).collect();
        assert_eq!(ops, vec!["first", "second"]);
    }

    #[test]
    fn check_result_passes_success_and_maps_failure() {
        let ctx = CommandContext::new();
        ctx.check_result("release", SUCCESS_CODE).unwrap();
        let err = ctx.check_result("release", 1003).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidConnectionHandle));
    }

    #[test]
    fn call_sync_waits_for_callback_thread() {
        let ctx = CommandContext::new();
        let value = ctx
            .call_sync("blocking", |handle, cb: Callback<String>| {
                std::thread::spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    cb.complete(handle, SUCCESS_CODE, "late".to_string()).unwrap();
                });
                SUCCESS_CODE
            })
            .unwrap();
        assert_eq!(value, "late");
    }

    #[test]
    fn call_sync_returns_rejection_immediately() {
        let ctx = CommandContext::new();
        let err = ctx
            .call_sync("blocking", |_handle, _cb: Callback<()>| 1005)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotReady));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_issues_see_only_their_own_results() {
        const OPERATIONS: u32 = 1_000;
        const DELIVERY_THREADS: usize = 6;

        let ctx = CommandContext::new();
        let calls = stash::<u32>();

        // every fifth command fails; payload and error both encode the handle
        let mut results = Vec::new();
        for _ in 0..OPERATIONS {
            let result = ctx.issue("stress", |handle, cb| {
                calls.lock().unwrap().push((handle, cb));
                SUCCESS_CODE
            });
            results.push(result);
        }

        let mut deliveries = std::mem::take(&mut *calls.lock().unwrap());
        deliveries.shuffle(&mut rand::thread_rng());
        let chunk = deliveries.len().div_ceil(DELIVERY_THREADS);
        let mut chunks = Vec::new();
        while !deliveries.is_empty() {
            let rest = deliveries.split_off(chunk.min(deliveries.len()));
            chunks.push(std::mem::replace(&mut deliveries, rest));
        }

        let threads: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for (handle, cb) in chunk {
                        if rng.gen_bool(0.1) {
                            std::thread::yield_now();
                        }
                        let raw = handle.as_raw();
                        if raw % 5 == 0 {
                            cb.complete_with_detail(handle, 1020, 0, Some(raw.to_string())).unwrap();
                        } else {
                            cb.complete(handle, SUCCESS_CODE, raw * 10).unwrap();
                        }
                    }
                })
            })
            .collect();

        let mut joins = Vec::new();
        for result in results {
            joins.push(tokio::spawn(async move {
                let raw = result.handle().as_raw();
                (raw, result.await)
            }));
        }
        for join in joins {
            let (raw, outcome) = join.await.unwrap();
            if raw % 5 == 0 {
                match outcome {
                    Err(TetherError::AsyncOperation { kind, detail, .. }) => {
                        assert_eq!(kind, ErrorKind::InvalidMessages);
                        assert_eq!(detail, Some(raw.to_string()));
                    }
                    other => panic!("{raw}: expected failure, got {other:?}"),
                }
            } else {
                assert_eq!(outcome.unwrap(), raw * 10);
            }
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(ctx.pending_count(), 0);
    }
}
