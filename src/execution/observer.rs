use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        concurrency: usize,
        queue_capacity: usize,
    },
    BackpressureWaited {
        duration: Duration,
    },
    ProducerFinished {
        rows_read: u64,
        succeeded: bool,
    },
    WorkerStarted {
        worker_id: usize,
    },
    WorkerFinished {
        worker_id: usize,
        rows_processed: u64,
        succeeded: bool,
    },
    RunFinished {
        elapsed: Duration,
        succeeded: bool,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        tracing::debug!(?event, "execution event");
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    rows_read: AtomicU64,
    rows_processed: AtomicU64,
    workers_started: AtomicU64,
    workers_finished: AtomicU64,
    backpressure_wait_ns: AtomicU64,

    active_workers: AtomicUsize,
    max_active_workers: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
            rows_processed: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
            workers_finished: AtomicU64::new(0),
            backpressure_wait_ns: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            max_active_workers: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = Some(Instant::now());
        }

        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_read.store(0, Ordering::SeqCst);
        self.rows_processed.store(0, Ordering::SeqCst);
        self.workers_started.store(0, Ordering::SeqCst);
        self.workers_finished.store(0, Ordering::SeqCst);
        self.backpressure_wait_ns.store(0, Ordering::SeqCst);
        self.active_workers.store(0, Ordering::SeqCst);
        self.max_active_workers.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(duration_ns(elapsed), Ordering::SeqCst);
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = None;
        }
    }

    pub fn on_row_read(&self) {
        let _ = self.rows_read.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_row_processed(&self) {
        let _ = self.rows_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_worker_start(&self) {
        let _ = self.workers_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_workers, now);
    }

    pub fn on_worker_end(&self) {
        let _ = self.workers_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_backpressure_wait(&self, d: Duration) {
        let _ = self
            .backpressure_wait_ns
            .fetch_add(duration_ns(d), Ordering::SeqCst);
    }

    /// Time since the current run started, while it is running.
    pub fn running_for(&self) -> Option<Duration> {
        self.started_at
            .lock()
            .ok()
            .and_then(|started_at| started_at.map(|t| t.elapsed()))
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            rows_read: self.rows_read.load(Ordering::SeqCst),
            rows_processed: self.rows_processed.load(Ordering::SeqCst),
            workers_started: self.workers_started.load(Ordering::SeqCst),
            workers_finished: self.workers_finished.load(Ordering::SeqCst),
            backpressure_wait: Duration::from_nanos(
                self.backpressure_wait_ns.load(Ordering::SeqCst),
            ),
            max_active_workers: self.max_active_workers.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ns(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_read: u64,
    pub rows_processed: u64,
    pub workers_started: u64,
    pub workers_finished: u64,
    pub backpressure_wait: Duration,
    pub max_active_workers: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows={}/{}, workers={}/{}, max_active_workers={}, backpressure_wait={:?}, elapsed={:?}",
            self.run_id,
            self.rows_processed,
            self.rows_read,
            self.workers_finished,
            self.workers_started,
            self.max_active_workers,
            self.backpressure_wait,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_run_resets_counters() {
        let metrics = ExecutionMetrics::new();
        metrics.begin_run();
        metrics.on_row_read();
        metrics.on_row_processed();
        metrics.on_worker_start();
        metrics.on_worker_start();
        metrics.on_worker_end();
        assert!(metrics.running_for().is_some());
        metrics.end_run(Duration::from_millis(5));
        assert!(metrics.running_for().is_none());

        let snap = metrics.snapshot();
        assert_eq!(snap.run_id, 1);
        assert_eq!(snap.rows_read, 1);
        assert_eq!(snap.max_active_workers, 2);
        assert_eq!(snap.workers_finished, 1);
        assert_eq!(snap.elapsed, Some(Duration::from_millis(5)));

        metrics.begin_run();
        let snap = metrics.snapshot();
        assert_eq!(snap.run_id, 2);
        assert_eq!(snap.rows_read, 0);
        assert_eq!(snap.elapsed, None);
        assert!(metrics.running_for().is_some());
    }
}
