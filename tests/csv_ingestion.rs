use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hierarchy_ingest::execution::{
    CancelToken, ExecutionEngine, ExecutionEvent, ExecutionObserver, ExecutionOptions,
};
use hierarchy_ingest::ingestion::csv::{ingest_csv_from_path, ingest_csv_from_reader};
use hierarchy_ingest::ingestion::parse_file;
use hierarchy_ingest::{CollisionPolicy, HierarchyError, Node, RecordError, SchemaError};
use proptest::prelude::*;

fn leaf() -> Node {
    Node::leaf()
}

fn category(children: Vec<(&str, Node)>) -> Node {
    Node {
        item: false,
        children: children
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn parse(input: &str) -> Result<Node, HierarchyError> {
    parse_file(&CancelToken::new(), input.as_bytes(), 10)
}

#[test]
fn parse_file_builds_expected_tree() {
    let input = "level_1,level_2,level_3,item_id\n1,12,103,12507622\n1,13,,32622917\n";
    let tree = parse(input).unwrap();

    let expected = category(vec![(
        "1",
        category(vec![
            ("12", category(vec![("103", category(vec![("12507622", leaf())]))])),
            ("13", category(vec![("32622917", leaf())])),
        ]),
    )]);
    assert_eq!(tree, expected);
}

#[test]
fn parse_file_from_path_fixture() {
    let engine = ExecutionEngine::new(ExecutionOptions::with_concurrency(4));
    let tree = ingest_csv_from_path(
        "tests/fixtures/hierarchy.csv",
        &CancelToken::new(),
        &engine,
        CollisionPolicy::MarkLeaf,
    )
    .unwrap();
    assert_eq!(tree, parse(include_str!("fixtures/hierarchy.csv")).unwrap());
}

#[test]
fn parse_file_errors_on_empty_level_1() {
    let input = "level_1,level_2,level_3,item_id\n,,103,12507622\n1,2,3,32622917\n";
    let err = parse(input).unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(
        &err,
        HierarchyError::Record {
            source: RecordError::MissingRequiredValue { column },
            ..
        } if column == "level_1"
    ));
    assert!(err.to_string().contains("missing required value for level_1"));
}

#[test]
fn parse_file_errors_on_missing_parent_level() {
    let input = "level_1,level_2,level_3,item_id\n1,,103,12507622\n1,,,32622917\n";
    let err = parse(input).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("missing required parent element for level_3"));
}

#[test]
fn parse_file_errors_on_missing_item_id() {
    let input = "level_1,level_2,level_3,item_id\n1,2,103,12507622\n1,2,3,\n";
    let err = parse(input).unwrap_err();
    assert!(err.to_string().contains("missing required value for item_id"));
}

#[test]
fn parse_file_errors_on_short_record() {
    let input = "level_1,level_2,item_id\n1,2\n";
    let err = parse(input).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("missing required value for item_id"));
}

#[test]
fn parse_file_errors_on_level_gap() {
    let input = "level_1,level_3,item_id\n1,103,12507622\n";
    let err = parse(input).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::Schema(SchemaError::NonContiguousLevels { .. })
    ));
    assert!(err.is_validation());
}

#[test]
fn parse_file_errors_on_reoccurring_column() {
    let input = "level_1,level_2,level_1,item_id\n1,2,3,4\n";
    let err = parse(input).unwrap_err();
    assert!(matches!(
        &err,
        HierarchyError::Schema(SchemaError::DuplicateColumn { name }) if name == "level_1"
    ));
}

#[test]
fn parse_file_errors_on_empty_input() {
    let err = parse("").unwrap_err();
    assert!(matches!(err, HierarchyError::Schema(SchemaError::MissingHeader)));
}

#[test]
fn parse_file_errors_on_invalid_utf8() {
    let input: &[u8] = b"level_1,item_id\n\xff\xfe,1\n";
    let err = parse_file(&CancelToken::new(), input, 2).unwrap_err();
    assert!(matches!(err, HierarchyError::Csv(_)));
    assert!(!err.is_validation());
}

#[test]
fn reject_policy_surfaces_collisions() {
    let input = "level_1,level_2,item_id\na,b,x\na,,b\n";
    let engine = ExecutionEngine::new(ExecutionOptions::with_concurrency(1));

    let tree = ingest_csv_from_reader(
        input.as_bytes(),
        &CancelToken::new(),
        &engine,
        CollisionPolicy::MarkLeaf,
    )
    .unwrap();
    let b = tree.get_path(&["a", "b"]).unwrap();
    assert!(b.is_leaf());
    assert!(b.child("x").unwrap().is_leaf());

    let err = ingest_csv_from_reader(
        input.as_bytes(),
        &CancelToken::new(),
        &engine,
        CollisionPolicy::Reject,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::Record {
            source: RecordError::LeafCollision { .. },
            ..
        }
    ));
}

/// Endless valid input: a header, then the same record forever.
struct EndlessRows {
    pending: Vec<u8>,
    pos: usize,
}

impl EndlessRows {
    fn new() -> Self {
        Self {
            pending: b"level_1,item_id\n".to_vec(),
            pos: 0,
        }
    }
}

impl Read for EndlessRows {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.pending.len() {
            self.pending = b"cat,item\n".to_vec();
            self.pos = 0;
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Holds every worker at start-up so the producer fills the queue and blocks.
struct SlowStart;

impl ExecutionObserver for SlowStart {
    fn on_event(&self, event: &ExecutionEvent) {
        if let ExecutionEvent::WorkerStarted { .. } = event {
            thread::sleep(Duration::from_millis(150));
        }
    }
}

#[test]
fn cancellation_while_queue_is_full_returns_no_tree() {
    let engine = ExecutionEngine::new(ExecutionOptions {
        concurrency: 1,
        queue_capacity: 1,
    })
    .with_observer(Arc::new(SlowStart));
    let metrics = engine.metrics();

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let result = ingest_csv_from_reader(EndlessRows::new(), &token, &engine, CollisionPolicy::MarkLeaf);
    canceller.join().unwrap();

    assert!(matches!(result, Err(HierarchyError::Cancelled)));
    let snap = metrics.snapshot();
    assert!(snap.rows_read <= 1);
    assert_eq!(snap.rows_processed, 0);
}

#[test]
fn deadline_on_endless_input_is_reported_distinctly() {
    let token = CancelToken::with_timeout(Duration::from_millis(30));
    let err = parse_file(&token, EndlessRows::new(), 4).unwrap_err();
    assert!(matches!(err, HierarchyError::DeadlineExceeded));
    assert!(!err.is_validation());
}

fn render(rows: &[(Vec<String>, String)]) -> String {
    let mut out = String::from("level_1,level_2,level_3,item_id\n");
    for (levels, item) in rows {
        out.push_str(&levels.join(","));
        out.push(',');
        out.push_str(item);
        out.push('\n');
    }
    out
}

fn row_strategy() -> impl Strategy<Value = (Vec<String>, String)> {
    (
        "[a-c]",
        prop::option::of(("[d-f]", prop::option::of("[g-i]"))),
        "[0-9]{1,3}",
    )
        .prop_map(|(l1, rest, item)| {
            let (l2, l3) = match rest {
                Some((l2, l3)) => (l2, l3.unwrap_or_default()),
                None => (String::new(), String::new()),
            };
            (vec![l1, l2, l3], format!("id{item}"))
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn tree_is_independent_of_concurrency(rows in prop::collection::vec(row_strategy(), 0..60)) {
        let input = render(&rows);
        let sequential = parse_file(&CancelToken::new(), input.as_bytes(), 1).unwrap();
        let parallel = parse_file(&CancelToken::new(), input.as_bytes(), 8).unwrap();
        prop_assert_eq!(&sequential, &parallel);

        let mut doubled = input.clone();
        doubled.push_str(input.trim_start_matches("level_1,level_2,level_3,item_id\n"));
        let twice = parse_file(&CancelToken::new(), doubled.as_bytes(), 8).unwrap();
        prop_assert_eq!(&sequential, &twice);
    }
}
