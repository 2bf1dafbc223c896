use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ErrorClass, HierarchyError};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (cancellation, deadline).
    Warning,
    /// Error-level event (invalid input).
    Error,
    /// Critical error (I/O, malformed stream, internal failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity of a failed parse.
    ///
    /// Follows [`HierarchyError::class`], so anything the caller is not at fault for alerts
    /// at the default threshold.
    pub fn for_error(e: &HierarchyError) -> Self {
        match e.class() {
            ErrorClass::Validation => Self::Error,
            ErrorClass::Cancelled => Self::Warning,
            ErrorClass::Internal => Self::Critical,
        }
    }
}

/// Where the parsed bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionSource {
    /// A file on disk.
    Path(PathBuf),
    /// A caller-supplied byte stream.
    Stream,
}

impl fmt::Display for IngestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Stream => f.write_str("<stream>"),
        }
    }
}

/// Context about an ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    pub source: IngestionSource,
    /// Worker count used for the attempt.
    pub concurrency: usize,
}

/// Stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of data records inserted.
    pub rows: u64,
    /// Number of distinct item nodes in the tree.
    pub items: usize,
    /// Number of nodes below the root (categories and items).
    pub nodes: usize,
    pub elapsed: Duration,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when ingestion succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when ingestion fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &HierarchyError) {}

    /// Called when an ingestion failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs ingestion events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            source = %ctx.source,
            concurrency = ctx.concurrency,
            rows = stats.rows,
            items = stats.items,
            nodes = stats.nodes,
            elapsed = ?stats.elapsed,
            "hierarchy parsed"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        tracing::warn!(source = %ctx.source, ?severity, %error, "hierarchy parse failed");
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        tracing::error!(source = %ctx.source, ?severity, %error, "hierarchy parse alert");
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok source={} rows={} items={} nodes={}",
            unix_ts(),
            ctx.source,
            stats.rows,
            stats.items,
            stats.nodes
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        self.append_line(&format!(
            "{} fail severity={:?} source={} err={}",
            unix_ts(),
            severity,
            ctx.source,
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HierarchyError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} source={} err={}",
            unix_ts(),
            severity,
            ctx.source,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecordError, SchemaError};

    #[test]
    fn severity_follows_error_class() {
        let schema = HierarchyError::from(SchemaError::MissingHeader);
        assert_eq!(IngestionSeverity::for_error(&schema), IngestionSeverity::Error);

        let record = HierarchyError::Record {
            line: 2,
            source: RecordError::LeafCollision { key: "x".into() },
        };
        assert_eq!(IngestionSeverity::for_error(&record), IngestionSeverity::Error);

        assert_eq!(
            IngestionSeverity::for_error(&HierarchyError::DeadlineExceeded),
            IngestionSeverity::Warning
        );
        assert_eq!(
            IngestionSeverity::for_error(&HierarchyError::from(std::io::Error::other("x"))),
            IngestionSeverity::Critical
        );
    }

    #[test]
    fn malformed_stream_is_critical() {
        let mut rdr = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&b"\xff,1\n"[..]);
        let mut record = ::csv::StringRecord::new();
        let err = HierarchyError::from(rdr.read_record(&mut record).unwrap_err());

        assert!(matches!(err, HierarchyError::Csv(_)));
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(IngestionSeverity::for_error(&err), IngestionSeverity::Critical);
    }

    #[test]
    fn source_displays_path_or_stream() {
        assert_eq!(IngestionSource::Stream.to_string(), "<stream>");
        assert_eq!(
            IngestionSource::Path(PathBuf::from("data/tree.csv")).to_string(),
            "data/tree.csv"
        );
    }
}
