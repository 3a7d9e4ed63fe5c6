//! Performance benchmarks for the reference layer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use refstore::{CollectionReference, DocumentReference, ObjectData, Region};
use serde_json::json;

fn object(value: serde_json::Value) -> ObjectData {
    value.as_object().cloned().unwrap()
}

/// Benchmark item updates with varying collection sizes
fn bench_collection_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_updates");

    for item_count in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("items", item_count),
            &item_count,
            |b, &count| {
                let items = CollectionReference::new(CollectionReference::new_context(
                    "bench",
                    Region::Public,
                ))
                .unwrap();
                for i in 0..count {
                    items
                        .create(&format!("item-{}", i), object(json!({"n": i})))
                        .unwrap();
                }

                b.iter(|| {
                    items.update("item-0", object(json!({"n": 1}))).unwrap();
                    black_box(items.stat().rev);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark coalesced document merges (the common hot path: a pending
/// flush absorbs every further mutation in the window)
fn bench_document_merge(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    c.bench_function("document_merge_coalesced", |b| {
        let doc = runtime.block_on(async {
            let mut context =
                DocumentReference::new_context("bench", Region::Public, ObjectData::new());
            context.meta.change_debounce = Some(60_000);
            DocumentReference::new(context).unwrap()
        });

        b.iter(|| {
            runtime.block_on(async {
                doc.merge_data(object(json!({"n": 1})));
            });
            black_box(doc.has_unsaved_changes());
        });
    });
}

criterion_group!(benches, bench_collection_updates, bench_document_merge);
criterion_main!(benches);
