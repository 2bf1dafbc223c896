//! Command-line interface for hierarchy-ingest.
//!
//! Reads a CSV hierarchy from a file (or stdin) and prints the resulting tree as JSON.
//!
//! Usage:
//!   hierarchy-ingest [PATH] [--concurrency N] [--timeout-ms MS] [--max-bytes N] [--pretty]
//!
//! Exit codes: 0 success, 1 internal failure, 2 invalid input, 3 cancelled / timed out.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use hierarchy_ingest::execution::{CancelToken, ExecutionOptions, TracingExecutionObserver};
use hierarchy_ingest::ingestion::{HierarchyParser, ParseOptions, TracingObserver};
use hierarchy_ingest::{CollisionPolicy, ErrorClass, HierarchyError};

/// Default input cap: 10 MiB.
const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

const EXIT_INTERNAL: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "hierarchy-ingest", version, about = "Parse a CSV category hierarchy into a JSON tree")]
struct Args {
    /// CSV file to parse; reads stdin when omitted
    path: Option<PathBuf>,

    /// Number of concurrent row workers
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Capacity of the row queue between reader and workers
    #[arg(long, default_value_t = 100)]
    queue_capacity: usize,

    /// Abort the parse after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Reject inputs larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: u64,

    /// Fail when an item id collides with a category at the same level
    #[arg(long)]
    reject_collisions: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Reader that fails once more than `limit` bytes were read.
struct LimitedReader<R> {
    inner: R,
    remaining: u64,
    exceeded: Arc<AtomicBool>,
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Allow one byte past the limit to tell "exactly at limit" from "over limit".
        let cap = buf.len().min(usize::try_from(self.remaining.saturating_add(1)).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..cap])?;
        if n as u64 > self.remaining {
            self.exceeded.store(true, Ordering::SeqCst);
            return Err(io::Error::other("input exceeds size limit"));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let input: Box<dyn Read + Send> = match &args.path {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(file),
            Err(e) => return fail(&HierarchyError::from(e).to_string(), EXIT_INTERNAL),
        },
        None => Box::new(io::stdin()),
    };
    let exceeded = Arc::new(AtomicBool::new(false));
    let input = LimitedReader {
        inner: input,
        remaining: args.max_bytes,
        exceeded: Arc::clone(&exceeded),
    };

    let parser = HierarchyParser::new(ParseOptions {
        execution: ExecutionOptions {
            concurrency: args.concurrency,
            queue_capacity: args.queue_capacity,
        },
        collision_policy: if args.reject_collisions {
            CollisionPolicy::Reject
        } else {
            CollisionPolicy::MarkLeaf
        },
        observer: Some(Arc::new(TracingObserver)),
        execution_observer: Some(Arc::new(TracingExecutionObserver)),
        ..Default::default()
    });

    let token = match args.timeout_ms {
        Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
        None => CancelToken::new(),
    };

    match parser.parse_reader(&token, input) {
        Ok(tree) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&tree)
            } else {
                serde_json::to_string(&tree)
            };
            match json {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&format!("could not encode tree: {e}"), EXIT_INTERNAL),
            }
        }
        Err(_) if exceeded.load(Ordering::SeqCst) => fail(
            &format!("input exceeds the {} byte limit", args.max_bytes),
            EXIT_INVALID_INPUT,
        ),
        Err(e) => fail(&e.to_string(), exit_code(&e)),
    }
}

fn exit_code(err: &HierarchyError) -> u8 {
    match err.class() {
        ErrorClass::Validation => EXIT_INVALID_INPUT,
        ErrorClass::Cancelled => EXIT_CANCELLED,
        ErrorClass::Internal => EXIT_INTERNAL,
    }
}

fn fail(message: &str, code: u8) -> ExitCode {
    let body = ErrorBody {
        message: message.to_owned(),
    };
    match serde_json::to_string(&body) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{message}"),
    }
    ExitCode::from(code)
}
