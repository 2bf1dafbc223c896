//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`HierarchyParser`] / [`parse_file`] (from [`unified`]) which:
//!
//! - resolves the header into a [`crate::schema::ColumnSchema`]
//! - runs the producer/worker pipeline into a [`crate::types::Node`] tree
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! The CSV pipeline pieces are also available under [`csv`].

pub mod csv;
pub mod observability;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionSource,
    IngestionStats, TracingObserver,
};
pub use unified::{parse_file, parse_from_path, HierarchyParser, ParseOptions};
