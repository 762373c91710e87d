use credence::estimate::{estimate_truth, EmConfig, InitialPrior};
use credence::matrix::SensingMatrix;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_matrix(n_sources: usize, n_claims: usize) -> SensingMatrix {
    let mut rng = StdRng::seed_from_u64(0x5EED + (n_sources * n_claims) as u64);
    let rows: Vec<Vec<u8>> = (0..n_sources)
        .map(|_| {
            (0..n_claims)
                .map(|_| u8::from(rng.gen_bool(0.3)))
                .collect()
        })
        .collect();
    SensingMatrix::from_rows(&rows).unwrap()
}

fn benchmark_em(c: &mut Criterion) {
    let shapes = [(20_usize, 50_usize), (50, 200), (100, 500)];
    let config = EmConfig {
        initial_prior: InitialPrior::Fixed(0.5),
        ..EmConfig::default()
    };

    let mut group = c.benchmark_group("em_truth_estimation");
    for &(n_sources, n_claims) in shapes.iter() {
        let matrix = random_matrix(n_sources, n_claims);
        group.throughput(Throughput::Elements((n_sources * n_claims) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", n_sources, n_claims)),
            &matrix,
            |b, input| {
                b.iter(|| {
                    let estimate = estimate_truth(black_box(input), &config).unwrap();
                    black_box(estimate.posterior);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(em_truth_estimation, benchmark_em);
criterion_main!(em_truth_estimation);
