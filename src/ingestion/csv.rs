//! CSV hierarchy ingestion.
//!
//! Rules:
//!
//! - The first record is the header and is resolved into a [`ColumnSchema`] before any
//!   data record is touched.
//! - Data records are read in file order by a single producer and handed to the workers
//!   through the engine's bounded queue; workers insert in whatever order they dequeue.
//! - Records may be shorter than the header; such records fail validation in the workers
//!   rather than failing the read.
//! - A single invalid record fails the whole input; no partial tree is returned.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use csv::StringRecord;

use crate::error::{HierarchyError, HierarchyResult, RecordError, SchemaError};
use crate::execution::{CancelToken, ExecutionEngine, TaskContext};
use crate::schema::ColumnSchema;
use crate::tree::SharedTree;
use crate::types::{CollisionPolicy, Node};

/// One data record plus the input line it started on.
#[derive(Debug, Clone)]
pub struct RowRecord {
    pub line: u64,
    pub fields: StringRecord,
}

/// Build the CSV reader used for hierarchy input.
///
/// Headers are handled by [`read_schema`], and record lengths are not enforced.
pub fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

/// Read the header record and resolve it into a [`ColumnSchema`].
pub fn read_schema<R: Read>(rdr: &mut csv::Reader<R>) -> HierarchyResult<ColumnSchema> {
    let mut header = StringRecord::new();
    if !rdr.read_record(&mut header)? {
        return Err(SchemaError::MissingHeader.into());
    }
    Ok(ColumnSchema::from_header(header.iter())?)
}

/// Ingest a CSV file into a hierarchy tree.
pub fn ingest_csv_from_path(
    path: impl AsRef<Path>,
    token: &CancelToken,
    engine: &ExecutionEngine,
    policy: CollisionPolicy,
) -> HierarchyResult<Node> {
    let file = File::open(path)?;
    ingest_csv_from_reader(file, token, engine, policy)
}

/// Ingest CSV data from any byte stream into a hierarchy tree.
pub fn ingest_csv_from_reader<R: Read + Send>(
    input: R,
    token: &CancelToken,
    engine: &ExecutionEngine,
    policy: CollisionPolicy,
) -> HierarchyResult<Node> {
    ingest_counted(input, token, engine, policy).map(|(root, _rows)| root)
}

/// Like [`ingest_csv_from_reader`], also returning the number of inserted records.
pub(crate) fn ingest_counted<R: Read + Send>(
    input: R,
    token: &CancelToken,
    engine: &ExecutionEngine,
    policy: CollisionPolicy,
) -> HierarchyResult<(Node, u64)> {
    let mut rdr = csv_reader(input);
    let schema = read_schema(&mut rdr)?;
    tracing::debug!(
        depth = schema.depth(),
        item_id_column = schema.item_id_index(),
        concurrency = engine.options().concurrency,
        queue_capacity = engine.options().queue_capacity,
        "resolved hierarchy header"
    );

    let tree = SharedTree::new(policy);
    let rows = AtomicU64::new(0);
    engine.run(
        token,
        move |ctx, tx| produce_rows(ctx, rdr, tx),
        |ctx, rx| {
            let inserted = insert_rows(ctx, rx, &schema, &tree)?;
            rows.fetch_add(inserted, Ordering::Relaxed);
            Ok(())
        },
    )?;

    Ok((tree.into_root(), rows.into_inner()))
}

fn produce_rows<R: Read>(
    ctx: &TaskContext<'_>,
    mut rdr: csv::Reader<R>,
    tx: Sender<RowRecord>,
) -> HierarchyResult<()> {
    let mut read = 0u64;
    loop {
        ctx.check()?;
        let mut fields = StringRecord::new();
        if !rdr.read_record(&mut fields)? {
            break;
        }
        let line = fields.position().map_or(0, |pos| pos.line());
        ctx.publish(&tx, RowRecord { line, fields })?;
        read += 1;
    }
    tracing::debug!(rows = read, "reached end of input");
    Ok(())
}

fn insert_rows(
    ctx: &TaskContext<'_>,
    rx: &Receiver<RowRecord>,
    schema: &ColumnSchema,
    tree: &SharedTree,
) -> HierarchyResult<u64> {
    let mut inserted = 0u64;
    while let Some(row) = ctx.next(rx)? {
        insert_row(&row, schema, tree).map_err(|source| HierarchyError::Record {
            line: row.line,
            source,
        })?;
        ctx.processed();
        inserted += 1;
    }
    tracing::debug!(rows = inserted, "worker drained queue");
    Ok(inserted)
}

/// Validate one record and insert its path plus item identifier.
pub fn insert_row(
    row: &RowRecord,
    schema: &ColumnSchema,
    tree: &SharedTree,
) -> Result<(), RecordError> {
    let path = schema.hierarchy_path(&row.fields)?;
    let item_id = schema.item_id(&row.fields)?;
    tree.insert(&path, item_id)
}
