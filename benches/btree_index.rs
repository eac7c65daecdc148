use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use pagedindex::relation::tuple_with_key;
use pagedindex::{AttrType, BTreeIndex, IndexConfig, MemoryRelation, Operator};
use tempfile::TempDir;

const ENTRY_COUNT: usize = 20_000;
const KEY_OFFSET: usize = 4;

fn relation(count: usize) -> MemoryRelation {
    let mut relation = MemoryRelation::new("bench");
    for i in 0..count {
        // Scatter keys so inserts do not always hit the rightmost leaf.
        let key = ((i * 7_919) % count) as i32;
        relation.push_record(tuple_with_key(16, KEY_OFFSET, key));
    }
    relation
}

fn build(dir: &TempDir, relation: &mut MemoryRelation) -> BTreeIndex {
    BTreeIndex::open_or_create(
        dir.path(),
        "bench",
        KEY_OFFSET as i32,
        AttrType::Integer,
        relation,
        IndexConfig::default(),
    )
    .expect("build index")
}

fn bulk_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/build");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ENTRY_COUNT as u64));
    let mut source = relation(ENTRY_COUNT);

    group.bench_function("scattered_keys", |b| {
        b.iter_batched(
            || TempDir::new().expect("tempdir"),
            |dir| {
                let index = build(&dir, &mut source);
                black_box(index.height());
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

fn range_scan(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let mut source = relation(ENTRY_COUNT);
    let mut index = build(&dir, &mut source);

    let mut group = c.benchmark_group("btree/scan");
    for width in [10, 1_000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_function(format!("width_{}", width), |b| {
            let mut low = 0i32;
            b.iter(|| {
                low = (low + 997) % (ENTRY_COUNT as i32 - width);
                let rids = index
                    .scan_range(low, Operator::Gte, low + width, Operator::Lt)
                    .expect("scan");
                black_box(rids.len());
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bulk_build, range_scan);
criterion_main!(benches);
