//! Throughput of batch classification.
//!
//! Compares:
//! 1. Four vs. eight concurrent walks
//! 2. Portable lanes vs. SSE4.1 (when available)

use acl_run::{search_with, Isa, SearchConfig, Width};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{as_slices, build, random_packets, random_rules};

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for (num_rules, num_tries) in [(16, 1), (64, 2), (128, 4)] {
        let rule_list = random_rules(&mut rng, num_rules, 8, 4);
        let rules = build(&rule_list, num_tries, 4);
        let packets = random_packets(&mut rng, &rule_list, 1024, 8);
        let data = as_slices(&packets);
        let mut results = vec![0u32; packets.len() * 4];

        group.throughput(Throughput::Elements(packets.len() as u64));
        for (name, width, isa) in [
            ("x4_portable", Width::X4, Isa::Portable),
            ("x8_portable", Width::X8, Isa::Portable),
            ("x4_auto", Width::X4, Isa::Auto),
            ("x8_auto", Width::X8, Isa::Auto),
        ] {
            let config = SearchConfig::default().with_width(width).with_isa(isa);
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}r_{}t", num_rules, num_tries)),
                &config,
                |b, config| {
                    b.iter(|| {
                        search_with(&rules, black_box(&data), &mut results, 4, config).unwrap();
                        black_box(&results);
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
