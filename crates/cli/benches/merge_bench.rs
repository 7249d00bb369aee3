use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use index::{encode_id, SecondaryIndex};
use pending::{DocId, Document, FieldType, IndexKey, PendingEntry, ScalarValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recordlist::RecordList;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;

const N_INDEXED: u64 = 10_000;
const N_BATCH: u64 = 500;

fn age_key() -> IndexKey {
    IndexKey::new("age", FieldType::Integer)
}

/// Documents for the indexed set (`0..N_INDEXED`, even ages in order) and
/// the batch (random ages).
fn build_docs() -> (BTreeMap<DocId, Document>, Vec<PendingEntry>) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut docs = BTreeMap::new();
    for id in 0..N_INDEXED {
        let mut d = Document::new();
        d.insert("age".into(), (id as i64 * 2).into());
        docs.insert(id, d);
    }
    let mut batch = Vec::new();
    for id in N_INDEXED..N_INDEXED + N_BATCH {
        let age: i64 = rng.gen_range(0..N_INDEXED as i64 * 2);
        let mut d = Document::new();
        d.insert("age".into(), age.into());
        docs.insert(id, d);
        batch.push(PendingEntry {
            id,
            value: ScalarValue::Integer(age),
        });
    }
    (docs, batch)
}

fn write_index(path: &Path) {
    let mut list = RecordList::open(path, index::ID_WIDTH).unwrap();
    for id in 0..N_INDEXED {
        list.append(&encode_id(id).unwrap()).unwrap();
    }
    list.close().unwrap();
}

fn merge_insert_benchmark(c: &mut Criterion) {
    let (docs, batch) = build_docs();
    c.bench_function("merge_insert_500_into_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                write_index(&dir.path().join("age-int.idx"));
                dir
            },
            |dir| {
                let mut idx = SecondaryIndex::open(dir.path(), age_key(), &docs).unwrap();
                idx.merge_insert(&batch).unwrap();
                idx.close().unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

fn single_insert_benchmark(c: &mut Criterion) {
    let (docs, batch) = build_docs();
    c.bench_function("single_insert_500_into_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                write_index(&dir.path().join("age-int.idx"));
                dir
            },
            |dir| {
                let mut idx = SecondaryIndex::open(dir.path(), age_key(), &docs).unwrap();
                for e in &batch {
                    idx.insert(e.id, e.value.clone()).unwrap();
                }
                idx.close().unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, merge_insert_benchmark, single_insert_benchmark);
criterion_main!(benches);
