//! Benchmarks for CSV hierarchy ingestion at different worker counts.
//!
//! Run with: cargo bench --bench ingestion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hierarchy_ingest::execution::CancelToken;
use hierarchy_ingest::ingestion::parse_file;

/// Build a three-level hierarchy with `rows` records spread over a fixed fan-out.
fn build_input(rows: usize) -> String {
    let mut out = String::from("level_1,level_2,level_3,item_id\n");
    for i in 0..rows {
        let l1 = i % 8;
        let l2 = (i / 8) % 16;
        // every fourth row stops at level 2
        let l3 = if i % 4 == 0 { String::new() } else { format!("c{}", (i / 128) % 32) };
        out.push_str(&format!("a{l1},b{l2},{l3},item{i}\n"));
    }
    out
}

fn bench_parse_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_file");

    for rows in [1_000, 20_000] {
        let input = build_input(rows);
        group.throughput(Throughput::Elements(rows as u64));

        for concurrency in [1, 4, 10] {
            group.bench_with_input(BenchmarkId::new(format!("workers_{concurrency}"), rows), &input, |b, input| {
                b.iter(|| {
                    let tree = parse_file(&CancelToken::new(), black_box(input.as_bytes()), concurrency);
                    black_box(tree.map(|root| root.item_count()))
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_parse_file);
criterion_main!(benches);
