//! LoopbackNative - 開発用の擬似ネイティブライブラリ
//!
//! 入口は本物と同じく即時 status を返し、コールバックは後から自前の
//! スレッドプールで配送する。配送前にランダムな遅延を入れるので、
//! 完了順は発行順と一致しない。
//!
//! # 学習ポイント
//! - Mutex + Condvar によるワークキュー（`Mutex<VecDeque<Job>>`）
//! - Drop でキューを drain してからスレッドを join

use rand::Rng;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::app::{Callback, Settings};
use crate::domain::{CommandHandle, ErrorKind, RawStatus, SUCCESS_CODE};

type Job = Box<dyn FnOnce() + Send>;

/// What the loopback should do with a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// Accept, then call back with `status` and `payload`.
    Complete { status: RawStatus, payload: T },
    /// Accept, then call back with a payload-less failure.
    Fail { status: RawStatus, detail: Option<String> },
    /// Refuse immediately; no callback.
    Reject(RawStatus),
    /// Accept and never call back.
    Never,
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    condvar: Condvar,
}

pub struct LoopbackNative {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    max_delay: Duration,
}

impl LoopbackNative {
    /// Start `workers` delivery threads (at least one).
    pub fn new(workers: usize, max_delay: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            condvar: Condvar::new(),
        });
        let workers = (0..workers.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("loopback-callback-{id}"))
                    .spawn(move || delivery_loop(&shared))
            })
            .collect::<io::Result<Vec<_>>>();

        let mut native = Self {
            shared,
            workers: Vec::new(),
            max_delay,
        };
        // on failure, dropping `native` stops the threads that did start
        native.workers = workers?;
        Ok(native)
    }

    pub fn from_settings(settings: &Settings) -> io::Result<Self> {
        Self::new(
            settings.loopback_workers,
            Duration::from_millis(settings.loopback_max_delay_ms),
        )
    }

    fn enqueue(&self, job: Job) {
        let max_us = self.max_delay.as_micros().min(u64::MAX as u128) as u64;
        let delay = Duration::from_micros(rand::thread_rng().gen_range(0..=max_us));
        let job: Job = Box::new(move || {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            job();
        });

        let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.jobs.push_back(job);
        self.shared.condvar.notify_one();
    }

    /// Generic entry point: follow `reply` for the command `handle`.
    pub fn submit<T: Send + 'static>(
        &self,
        handle: CommandHandle,
        callback: Callback<T>,
        reply: Reply<T>,
    ) -> RawStatus {
        match reply {
            Reply::Reject(status) => status,
            Reply::Never => SUCCESS_CODE,
            Reply::Complete { status, payload } => {
                self.enqueue(Box::new(move || {
                    if let Err(err) = callback.complete(handle, status, payload) {
                        tracing::error!(%handle, error = %err, "loopback delivery failed");
                    }
                }));
                SUCCESS_CODE
            }
            Reply::Fail { status, detail } => {
                self.enqueue(Box::new(move || {
                    if let Err(err) = callback.fail(handle, status, detail) {
                        tracing::error!(%handle, error = %err, "loopback delivery failed");
                    }
                }));
                SUCCESS_CODE
            }
        }
    }

    /// Echo entry point: calls back with the request text.
    ///
    /// Text that is not a JSON object is refused up front with `INVALID_JSON`.
    pub fn echo(&self, handle: CommandHandle, callback: Callback<String>, params_json: &str) -> RawStatus {
        match serde_json::from_str::<serde_json::Value>(params_json) {
            Ok(serde_json::Value::Object(_)) => self.submit(
                handle,
                callback,
                Reply::Complete {
                    status: SUCCESS_CODE,
                    payload: params_json.to_string(),
                },
            ),
            _ => ErrorKind::InvalidJson.code(),
        }
    }
}

fn delivery_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                queue = shared
                    .condvar
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
    }
}

impl Drop for LoopbackNative {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.shutdown = true;
        }
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CommandContext;
    use crate::domain::{JsonParameterSet, TetherError};

    #[tokio::test]
    async fn echo_returns_request_text() {
        let ctx = CommandContext::new();
        let native = LoopbackNative::new(2, Duration::from_millis(2)).unwrap();
        let params = JsonParameterSet::new().with("source_id", "abc").with("n", 3);

        let json = params.to_json();
        let result = ctx.issue("echo", |h, cb| native.echo(h, cb, &json));
        assert_eq!(result.await.unwrap(), r#"{"source_id":"abc","n":3}"#);
    }

    #[tokio::test]
    async fn echo_refuses_non_object_json() {
        let ctx = CommandContext::new();
        let native = LoopbackNative::new(1, Duration::ZERO).unwrap();

        let result = ctx.issue("echo", |h, cb| native.echo(h, cb, "[1,2]"));
        let err = result.await.unwrap_err();
        assert!(matches!(err, TetherError::NativeCall { kind: ErrorKind::InvalidJson, .. }));
        assert_eq!(ctx.pending_count(), 0);
    }

    #[tokio::test]
    async fn scripted_failures_arrive_as_async_errors() {
        let ctx = CommandContext::new();
        let native = LoopbackNative::new(1, Duration::ZERO).unwrap();

        let failed = ctx.issue("op", |h, cb: Callback<u32>| {
            native.submit(h, cb, Reply::Fail { status: 1010, detail: None })
        });
        let err = failed.await.unwrap_err();
        assert!(matches!(err, TetherError::AsyncOperation { kind: ErrorKind::PostMessageFailure, .. }));
    }

    #[tokio::test]
    async fn never_leaves_entry_outstanding() {
        let ctx = CommandContext::new();
        let native = LoopbackNative::new(1, Duration::ZERO).unwrap();

        let _leaked = ctx.issue("lost", |h, cb: Callback<()>| native.submit(h, cb, Reply::Never));
        assert_eq!(ctx.pending_count(), 1);
        assert_eq!(ctx.outstanding()[0].operation, "lost");
    }

    #[test]
    fn drop_drains_queued_callbacks() {
        let ctx = CommandContext::new();
        let native = LoopbackNative::new(2, Duration::from_millis(1)).unwrap();

        let results: Vec<_> = (0..50u32)
            .map(|i| {
                ctx.issue("drain", |h, cb| {
                    native.submit(h, cb, Reply::Complete { status: SUCCESS_CODE, payload: i })
                })
            })
            .collect();
        drop(native);

        assert_eq!(ctx.pending_count(), 0);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.wait_blocking().unwrap(), i as u32);
        }
    }
}
