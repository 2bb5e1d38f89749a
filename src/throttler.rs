//! Provides a struct for pacing asynchronous calls against a rate-limited service.
//!
//! The basic flow is:
//! 1. Hand an operation to [`Throttler::submit`] (or [`Throttler::call`] with its arguments)
//! 2. It is appended to a FIFO queue, and a dispatch loop is spawned if none is running
//! 3. The loop takes one call at a time: if the trailing window still has room it records the
//!    dispatch instant and runs the call to completion, otherwise it sleeps until the oldest
//!    dispatch leaves the window
//! 4. Each call's output lands in its own [`Completion`]
//! 5. Once the queue is empty the loop exits; the next submission spawns a fresh one

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::completion::{self, Completion};
use crate::{ConfigError, DispatchError, SlidingWindow, ThrottlerConfig};

/// A queued call, already bound to its arguments and its completion handle.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct DispatchState {
    queue: VecDeque<Job>,
    window: SlidingWindow,
    /// Set while a dispatch loop owns the queue.
    running: bool,
}

struct Shared {
    config: ThrottlerConfig,
    state: Mutex<DispatchState>,
    total_dispatched: AtomicU64,
}

/// What the dispatch loop does next, decided under the lock and carried out outside it.
enum Step {
    Wait { wait: Duration, queued: usize },
    Dispatch(Job),
}

/// Serializes and paces calls so that no more than `limit` of them start within any trailing
/// `window`.
///
/// Calls run one at a time, strictly in submission order. Clones share the same queue and window,
/// so a single throttler can be handed to every collaborator talking to the same service.
#[derive(Clone)]
pub struct Throttler {
    shared: Arc<Shared>,
}

impl Throttler {
    /// A throttler allowing `limit` calls to start within any trailing `window`.
    pub fn new(limit: usize, window: Duration) -> Result<Self, ConfigError> {
        Self::with_config(ThrottlerConfig::new(limit, window))
    }

    pub fn with_config(config: ThrottlerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: ThrottlerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(DispatchState {
                    queue: VecDeque::new(),
                    window: SlidingWindow::new(config.limit, config.window),
                    running: false,
                }),
                total_dispatched: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `operation` and return a handle that resolves once it has been dispatched and run.
    ///
    /// The operation isn't invoked until its turn comes. Whatever it returns, including its own
    /// `Err`, is delivered untouched; a panic is caught and delivered as
    /// [`DispatchError::Panicked`] to this handle only.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while no dispatch loop is running, since the loop
    /// is spawned onto the current runtime. The call is not queued in that case, and the
    /// throttler keeps working for later submissions made inside a runtime.
    pub fn submit<F, Fut, T>(&self, operation: F) -> Completion<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (resolver, completion) = completion::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { operation().await })
                    .catch_unwind()
                    .await
                    .map_err(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(%message, "throttled operation panicked");
                        DispatchError::Panicked(message)
                    });
                resolver.resolve(outcome);
            }
            .boxed()
        });
        self.enqueue(job);
        completion
    }

    /// Like [`submit`](Self::submit), forwarding `args` to `operation` when it is dispatched.
    /// Use a tuple for more than one argument.
    pub fn call<F, A, Fut, T>(&self, operation: F, args: A) -> Completion<T>
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(move || operation(args))
    }

    /// Number of calls dispatched so far. Counts executions, not submissions.
    pub fn total_dispatched(&self) -> u64 {
        self.shared.total_dispatched.load(Ordering::SeqCst)
    }

    /// Number of calls waiting for their turn.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Number of dispatches still inside the trailing window. Read-only: stale timestamps are
    /// left for the dispatch loop to prune.
    pub fn in_window(&self) -> usize {
        self.shared.lock().window.len(Instant::now())
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn config(&self) -> &ThrottlerConfig {
        &self.shared.config
    }

    fn enqueue(&self, job: Job) {
        let runtime = Handle::try_current();
        let handle = {
            let mut state = self.shared.lock();
            if state.running {
                state.queue.push_back(job);
                return;
            }
            match runtime {
                Ok(handle) => {
                    state.queue.push_back(job);
                    state.running = true;
                    handle
                }
                // Nothing has been queued or flagged, so the throttler stays usable
                Err(err) => {
                    drop(state);
                    panic!("cannot start the dispatch loop: {}", err);
                }
            }
        };

        handle.spawn(Arc::clone(&self.shared).run());
    }
}

impl Default for Throttler {
    /// 100 calls per 10 seconds.
    fn default() -> Self {
        Self::from_valid_config(ThrottlerConfig::default())
    }
}

impl fmt::Debug for Throttler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttler")
            .field("config", &self.shared.config)
            .field("total_dispatched", &self.total_dispatched())
            .field("queued", &self.queued())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        // The lock is never held across user code, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain the queue. Only ever one instance per throttler, guarded by `running`.
    async fn run(self: Arc<Self>) {
        let mut guard = LoopGuard {
            shared: Arc::clone(&self),
            armed: true,
        };
        debug!(limit = self.config.limit, "dispatch loop started");

        loop {
            let step = {
                let mut state = self.lock();
                let Some(job) = state.queue.pop_front() else {
                    state.running = false;
                    break;
                };

                // Keyed to the dispatch instant, not to when the call finishes
                let now = Instant::now();
                match state.window.try_record(now) {
                    Ok(()) => Step::Dispatch(job),
                    Err(wait) => {
                        state.queue.push_front(job);
                        Step::Wait {
                            wait,
                            queued: state.queue.len(),
                        }
                    }
                }
            };

            match step {
                Step::Wait { wait, queued } => {
                    info!(
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        queued,
                        limit = self.config.limit,
                        "rate limit reached, waiting for the window to free a slot"
                    );
                    sleep(wait).await;
                }
                Step::Dispatch(job) => {
                    let total = self.total_dispatched.fetch_add(1, Ordering::SeqCst) + 1;
                    trace!(total, "dispatching call");
                    job().await;
                }
            }
        }

        guard.armed = false;
        debug!(
            total = self.total_dispatched.load(Ordering::SeqCst),
            "dispatch loop idle"
        );
    }
}

/// Hands the queue back if the loop task is dropped mid-flight, e.g. on runtime shutdown.
/// Pending calls are dropped, which resolves their handles with [`DispatchError::Abandoned`].
struct LoopGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned: Vec<Job> = {
            let mut state = self.shared.lock();
            state.running = false;
            state.queue.drain(..).collect()
        };
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "dispatch loop stopped with calls still queued");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
