use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hearsay_core::{AuthTree, Message, TreeHash};
use hearsay_testkit::vectors::all_vectors;

fn bench_codec(c: &mut Criterion) {
    let vectors = all_vectors();
    let messages: Vec<(&str, Message)> = vectors.iter().map(|v| (v.name, (v.build)())).collect();

    let mut group = c.benchmark_group("decode");
    for (name, message) in &messages {
        let hex = message.encode();
        group.bench_with_input(BenchmarkId::from_parameter(name), &hex, |b, hex| {
            b.iter(|| Message::decode(black_box(hex)).unwrap())
        });
    }
    group.finish();

    c.bench_function("hash/cross-post", |b| {
        let (_, message) = &messages[1];
        b.iter(|| Message::decode(black_box(&message.encode())).unwrap().hash())
    });
}

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    for count in [16u64, 256, 1024] {
        let leaves: Vec<TreeHash> = (1..=count).map(TreeHash::from_u64).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &leaves, |b, leaves| {
            b.iter(|| AuthTree::from_leaves(15, leaves.iter().copied()).unwrap().root())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_tree);
criterion_main!(benches);
