//! `hierarchy-ingest` turns CSV rows describing a multi-level category hierarchy into an
//! in-memory tree that serializes straight to JSON.
//!
//! The primary entrypoint is [`ingestion::parse_file`] (or [`ingestion::HierarchyParser`] for
//! full control over concurrency, collision handling and observers).
//!
//! ## Input shape
//!
//! The first CSV record is a header. Recognized column names:
//!
//! - `item_id`: the leaf identifier (required)
//! - `level_1`, `level_2`, ...: category segments by depth (`level_1` required, no gaps)
//!
//! Columns may appear in any order. Trailing empty levels shorten a record's path; a populated
//! level after an empty one is rejected.
//!
//! ## Quick example
//!
//! ```rust
//! use hierarchy_ingest::execution::CancelToken;
//! use hierarchy_ingest::ingestion::parse_file;
//!
//! # fn main() -> Result<(), hierarchy_ingest::HierarchyError> {
//! let input = "level_1,level_2,level_3,item_id\n1,12,103,12507622\n1,13,,32622917\n";
//! let tree = parse_file(&CancelToken::new(), input.as_bytes(), 10)?;
//!
//! assert_eq!(
//!     serde_json::to_string(&tree).unwrap(),
//!     r#"{"children":{"1":{"children":{"12":{"children":{"103":{"children":{"12507622":{"item":true}}}}},"13":{"children":{"32622917":{"item":true}}}}}}}"#
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! One producer reads records in file order into a bounded queue; `concurrency` workers drain
//! it, validate each record and insert it into a mutex-guarded tree. The first failure cancels
//! every task and is the only error returned. Callers cancel or bound a parse through
//! [`execution::CancelToken`].
//!
//! ## Modules
//!
//! - [`ingestion`]: parse entrypoints, the CSV pipeline and observer hooks
//! - [`execution`]: worker pool engine, cancellation, metrics
//! - [`schema`]: header → column role resolution
//! - [`types`]: the output tree and per-record paths
//! - [`tree`]: the lock-protected tree used while parsing
//! - [`error`]: error types and their classification

pub mod error;
pub mod execution;
pub mod ingestion;
pub mod schema;
pub mod tree;
pub mod types;

pub use error::{ErrorClass, HierarchyError, HierarchyResult, RecordError, SchemaError};
pub use types::{CollisionPolicy, HierarchyPath, Node};
