//! Execution engine for the concurrent ingestion pipeline.
//!
//! The engine runs one producer task and `concurrency` worker tasks connected by a bounded
//! queue:
//!
//! - backpressure: the producer blocks once `queue_capacity` items are outstanding
//! - first-error-wins: the first failing task cancels every other task (see [`TaskGroup`])
//! - cooperative cancellation: every blocking queue operation also waits on the caller's
//!   [`CancelToken`] and its deadline
//! - real-time metrics + observer hooks for monitoring

mod cancel;
mod group;
mod observer;

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use rayon::ThreadPoolBuilder;

use crate::error::{HierarchyError, HierarchyResult};

pub use cancel::{CancelReason, CancelToken};
pub use group::TaskGroup;
pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver,
    TracingExecutionObserver,
};

/// Worker count used when none (or zero) is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Outstanding-item bound of the producer → worker queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of concurrent workers. Values below 1 fall back to [`DEFAULT_CONCURRENCY`].
    pub concurrency: usize,
    /// Capacity of the bounded queue. Values below 1 fall back to [`DEFAULT_QUEUE_CAPACITY`].
    pub queue_capacity: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ExecutionOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Options with out-of-range values replaced by their defaults.
    pub fn normalized(&self) -> Self {
        Self {
            concurrency: if self.concurrency < 1 {
                DEFAULT_CONCURRENCY
            } else {
                self.concurrency
            },
            queue_capacity: if self.queue_capacity < 1 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                self.queue_capacity
            },
        }
    }
}

/// Runs producer/worker pipelines with configurable parallelism.
pub struct ExecutionEngine {
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    pub fn new(opts: ExecutionOptions) -> Self {
        Self {
            opts: opts.normalized(),
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    ///
    /// Every run resets the counters on start, so they describe a single run only when runs
    /// on this engine do not overlap.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    /// Run `produce` and `concurrency` copies of `work` until all of them terminate.
    ///
    /// `produce` publishes items with [`TaskContext::publish`]; the queue is closed when it
    /// returns. Each worker drains items with [`TaskContext::next`]. The first error of any
    /// task cancels the rest and is returned once every task has stopped.
    pub fn run<T, P, W>(&self, parent: &CancelToken, produce: P, work: W) -> HierarchyResult<()>
    where
        T: Send,
        P: FnOnce(&TaskContext<'_>, Sender<T>) -> HierarchyResult<()> + Send,
        W: Fn(&TaskContext<'_>, &Receiver<T>) -> HierarchyResult<()> + Sync,
    {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted {
            concurrency: self.opts.concurrency,
            queue_capacity: self.opts.queue_capacity,
        });

        // Every task blocks on the queue, so each one needs its own thread.
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.opts.concurrency + 1)
            .thread_name(|i| format!("hierarchy-ingest-{i}"))
            .build()
            .map_err(|e| HierarchyError::internal(format!("failed to build worker pool: {e}")))?;

        let group = TaskGroup::new(parent);
        let (tx, rx) = crossbeam_channel::bounded::<T>(self.opts.queue_capacity);

        pool.scope(|s| {
            let group = &group;
            let work = &work;

            s.spawn(move |_| {
                let ctx = TaskContext::new(self, group.token());
                let succeeded = group.run(|| produce(&ctx, tx));
                self.emit(ExecutionEvent::ProducerFinished {
                    rows_read: ctx.handled.get(),
                    succeeded,
                });
            });

            for worker_id in 0..self.opts.concurrency {
                let rx = rx.clone();
                s.spawn(move |_| {
                    self.metrics.on_worker_start();
                    self.emit(ExecutionEvent::WorkerStarted { worker_id });

                    let ctx = TaskContext::new(self, group.token());
                    let succeeded = group.run(|| work(&ctx, &rx));

                    self.emit(ExecutionEvent::WorkerFinished {
                        worker_id,
                        rows_processed: ctx.handled.get(),
                        succeeded,
                    });
                    self.metrics.on_worker_end();
                });
            }
            drop(rx);
        });

        let result = group.into_result();
        let elapsed = start.elapsed();
        self.metrics.end_run(elapsed);
        self.emit(ExecutionEvent::RunFinished {
            elapsed,
            succeeded: result.is_ok(),
            metrics: self.metrics.snapshot(),
        });
        result
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

/// Per-task view of a running pipeline: cancellation signals plus metric hooks.
pub struct TaskContext<'a> {
    engine: &'a ExecutionEngine,
    token: &'a CancelToken,
    deadline: Receiver<Instant>,
    handled: Cell<u64>,
}

impl<'a> TaskContext<'a> {
    fn new(engine: &'a ExecutionEngine, token: &'a CancelToken) -> Self {
        Self {
            engine,
            token,
            deadline: token.deadline_signal(),
            handled: Cell::new(0),
        }
    }

    /// Error to return if the pipeline has been cancelled or the deadline passed.
    pub fn interrupted(&self) -> Option<HierarchyError> {
        self.token.reason().map(HierarchyError::from)
    }

    /// Fail with the cancellation outcome if the pipeline was interrupted.
    pub fn check(&self) -> HierarchyResult<()> {
        match self.interrupted() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Publish one item, blocking while the queue is full.
    ///
    /// Returns the cancellation outcome if the pipeline is cancelled while waiting.
    pub fn publish<T>(&self, tx: &Sender<T>, item: T) -> HierarchyResult<()> {
        self.check()?;
        let item = match tx.try_send(item) {
            Ok(()) => return self.published(),
            Err(TrySendError::Full(item)) => item,
            Err(TrySendError::Disconnected(_)) => return Err(self.queue_closed()),
        };

        let waited = Instant::now();
        select! {
            send(tx, item) -> sent => {
                sent.map_err(|_| self.queue_closed())?;
                self.on_backpressure(waited.elapsed());
                self.published()
            }
            recv(self.token.done()) -> _ => Err(self.cancellation()),
            recv(self.deadline) -> _ => Err(self.token.expire().into()),
        }
    }

    /// Take the next item, blocking while the queue is empty.
    ///
    /// Returns `Ok(None)` once the queue is closed and drained. Items dequeued after the
    /// pipeline was cancelled are discarded.
    pub fn next<T>(&self, rx: &Receiver<T>) -> HierarchyResult<Option<T>> {
        select! {
            recv(rx) -> item => match item {
                Ok(item) => {
                    self.check()?;
                    Ok(Some(item))
                }
                Err(_) => Ok(None),
            },
            recv(self.token.done()) -> _ => Err(self.cancellation()),
            recv(self.deadline) -> _ => Err(self.token.expire().into()),
        }
    }

    /// Record one item fully processed by a worker.
    pub fn processed(&self) {
        self.handled.set(self.handled.get() + 1);
        self.engine.metrics.on_row_processed();
    }

    fn published(&self) -> HierarchyResult<()> {
        self.handled.set(self.handled.get() + 1);
        self.engine.metrics.on_row_read();
        Ok(())
    }

    fn on_backpressure(&self, waited: Duration) {
        self.engine.metrics.on_backpressure_wait(waited);
        self.engine
            .emit(ExecutionEvent::BackpressureWaited { duration: waited });
    }

    fn cancellation(&self) -> HierarchyError {
        self.interrupted().unwrap_or(HierarchyError::Cancelled)
    }

    fn queue_closed(&self) -> HierarchyError {
        self.interrupted()
            .unwrap_or_else(|| HierarchyError::internal("row queue closed unexpectedly"))
    }
}
