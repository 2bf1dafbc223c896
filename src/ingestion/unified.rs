//! Unified ingestion entrypoints.
//!
//! Most callers should use [`HierarchyParser`] (or the [`parse_file`] shorthand), which parses a
//! CSV byte stream into a hierarchy [`Node`] using the configured [`ParseOptions`].
//!
//! - The caller owns cancellation: pass a [`CancelToken`] (optionally with a deadline).
//! - If an [`super::observability::IngestionObserver`] is provided, success/failure/alerts are
//!   reported to it.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::HierarchyResult;
use crate::execution::{
    CancelToken, ExecutionEngine, ExecutionMetrics, ExecutionObserver, ExecutionOptions,
};
use crate::types::{CollisionPolicy, Node};

use super::csv;
use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionSource, IngestionStats,
};

/// Options controlling hierarchy parsing.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct ParseOptions {
    /// Worker count and queue capacity.
    pub execution: ExecutionOptions,
    /// Handling of item identifiers that collide with category keys.
    pub collision_policy: CollisionPolicy,
    /// Optional observer for outcome logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Optional observer for pipeline execution events.
    pub execution_observer: Option<Arc<dyn ExecutionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("execution", &self.execution)
            .field("collision_policy", &self.collision_policy)
            .field("observer_set", &self.observer.is_some())
            .field("execution_observer_set", &self.execution_observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            execution: ExecutionOptions::default(),
            collision_policy: CollisionPolicy::default(),
            observer: None,
            execution_observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Parses CSV hierarchy input with a fixed configuration.
///
/// A parser can be shared between threads; every parse runs its own worker pool. Parses that
/// overlap in time share one set of [`HierarchyParser::metrics`] counters.
pub struct HierarchyParser {
    options: ParseOptions,
    engine: ExecutionEngine,
}

impl fmt::Debug for HierarchyParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchyParser")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for HierarchyParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl HierarchyParser {
    pub fn new(options: ParseOptions) -> Self {
        let mut engine = ExecutionEngine::new(options.execution.clone());
        if let Some(obs) = options.execution_observer.clone() {
            engine = engine.with_observer(obs);
        }
        let options = ParseOptions {
            execution: engine.options().clone(),
            ..options
        };
        Self { options, engine }
    }

    /// Parser with `concurrency` workers (values below 1 use the default of 10).
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self::new(ParseOptions {
            execution: ExecutionOptions::with_concurrency(concurrency),
            ..Default::default()
        })
    }

    /// Effective options (after defaults were applied).
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Live metrics of the most recent parse.
    ///
    /// Counters are reset when a parse starts; with overlapping parses they mix both runs.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        self.engine.metrics()
    }

    /// Parse a CSV byte stream into a hierarchy tree.
    ///
    /// Returns the complete tree, or the first error observed by any task. The stream is read
    /// to the end (or until the first failure); bounding its size is up to the caller.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hierarchy_ingest::execution::CancelToken;
    /// use hierarchy_ingest::ingestion::HierarchyParser;
    ///
    /// # fn main() -> Result<(), hierarchy_ingest::HierarchyError> {
    /// let input = "level_1,level_2,item_id\nfood,fruit,apple\nfood,,bread\n";
    /// let tree = HierarchyParser::with_concurrency(4).parse_reader(&CancelToken::new(), input.as_bytes())?;
    ///
    /// assert!(tree.get_path(&["food", "fruit", "apple"]).unwrap().is_leaf());
    /// assert!(tree.get_path(&["food", "bread"]).unwrap().is_leaf());
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse_reader<R: Read + Send>(&self, token: &CancelToken, input: R) -> HierarchyResult<Node> {
        self.parse_observed(IngestionSource::Stream, token, input)
    }

    /// Parse the CSV file at `path`.
    pub fn parse_path(&self, token: &CancelToken, path: impl AsRef<Path>) -> HierarchyResult<Node> {
        let path = path.as_ref();
        let source = IngestionSource::Path(path.to_path_buf());
        match File::open(path) {
            Ok(file) => self.parse_observed(source, token, file),
            Err(e) => {
                let result: HierarchyResult<Node> = Err(e.into());
                self.report(&self.context(source), &result, 0, Instant::now());
                result
            }
        }
    }

    fn parse_observed<R: Read + Send>(
        &self,
        source: IngestionSource,
        token: &CancelToken,
        input: R,
    ) -> HierarchyResult<Node> {
        let started = Instant::now();
        let ctx = self.context(source);
        let result = csv::ingest_counted(input, token, &self.engine, self.options.collision_policy);

        let (result, rows) = match result {
            Ok((root, rows)) => (Ok(root), rows),
            Err(e) => (Err(e), 0),
        };
        match &result {
            Ok(root) => tracing::info!(
                source = %ctx.source,
                rows,
                items = root.item_count(),
                "hierarchy parse finished"
            ),
            Err(e) => tracing::warn!(source = %ctx.source, error = %e, "hierarchy parse failed"),
        }
        self.report(&ctx, &result, rows, started);
        result
    }

    fn context(&self, source: IngestionSource) -> IngestionContext {
        IngestionContext {
            source,
            concurrency: self.options.execution.concurrency,
        }
    }

    fn report(&self, ctx: &IngestionContext, result: &HierarchyResult<Node>, rows: u64, started: Instant) {
        let Some(obs) = self.options.observer.as_ref() else {
            return;
        };
        match result {
            Ok(root) => obs.on_success(
                ctx,
                IngestionStats {
                    rows,
                    items: root.item_count(),
                    nodes: root.descendant_count(),
                    elapsed: started.elapsed(),
                },
            ),
            Err(e) => {
                let sev = IngestionSeverity::for_error(e);
                obs.on_failure(ctx, sev, e);
                if sev >= self.options.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }
}

/// Parse a CSV hierarchy from `input` with `concurrency` workers.
///
/// Returns the complete tree on success; on any failure returns the first error and no tree.
pub fn parse_file<R: Read + Send>(token: &CancelToken, input: R, concurrency: usize) -> HierarchyResult<Node> {
    HierarchyParser::with_concurrency(concurrency).parse_reader(token, input)
}

/// Parse the CSV file at `path` with the given options and no deadline.
pub fn parse_from_path(path: impl AsRef<Path>, options: &ParseOptions) -> HierarchyResult<Node> {
    HierarchyParser::new(options.clone()).parse_path(&CancelToken::new(), path)
}
