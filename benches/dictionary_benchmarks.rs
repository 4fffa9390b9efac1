use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rdfcore::kv::tuning::LsmPreset;
use rdfcore::sharded_dictionary::ShardedDictionary;
use rdfcore::Term;

fn bench_get_or_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("dictionary_get_or_create");
    for shard_count in [1, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(shard_count),
            &shard_count,
            |b, &shard_count| {
                let dir = tempfile::tempdir().unwrap();
                let dict =
                    ShardedDictionary::open(dir.path(), &LsmPreset::WriteHeavy.config(), Some(shard_count))
                        .unwrap();
                let mut counter = 0u64;
                b.iter(|| {
                    counter += 1;
                    let term = Term::iri(format!("http://example.org/term/{counter}"));
                    dict.get_or_create_id(&term).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_batch_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("dictionary_batch_resolution");
    for batch_size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &batch_size| {
            let dir = tempfile::tempdir().unwrap();
            let dict =
                ShardedDictionary::open(dir.path(), &LsmPreset::WriteHeavy.config(), Some(4)).unwrap();
            b.iter_batched(
                || {
                    (0..batch_size)
                        .map(|i| Term::iri(format!("http://example.org/batch/{i}")))
                        .collect::<Vec<_>>()
                },
                |terms| dict.get_or_create_ids(&terms, None).unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_get_or_create, bench_batch_resolution);
criterion_main!(benches);
