use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use robustmix_common::field::{Fe, FieldCtx};
use robustmix_common::poly::build_from_roots;
use robustmix_common::roots::{find_roots, newton_to_polynomial};

fn bench_find_roots(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_roots");
    for degree in [23, 75, 155] {
        let ctx = FieldCtx::from_bit_length(32).unwrap();
        let mut rng = StdRng::seed_from_u64(degree as u64);
        let roots: Vec<Fe> = (0..degree).map(|_| ctx.random(&mut rng)).collect();
        let f = build_from_roots(&ctx, &roots);
        group.bench_with_input(BenchmarkId::from_parameter(degree), &f, |b, f| {
            b.iter(|| find_roots(&ctx, f, &mut rng))
        });
    }
    group.finish();
}

fn bench_newton(c: &mut Criterion) {
    let ctx = FieldCtx::from_bit_length(256).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let n = 399;
    let sums: Vec<Fe> = (0..n).map(|_| ctx.random(&mut rng)).collect();
    c.bench_function("newton_to_polynomial/399", |b| {
        b.iter(|| newton_to_polynomial(&ctx, &sums, n))
    });
}

criterion_group!(benches, bench_find_roots, bench_newton);
criterion_main!(benches);
