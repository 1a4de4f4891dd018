use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use salsa_pnb::{
    run_trial, salsa, BitPos, CipherParams, Distinguisher, HalfRounds, KeySize, PnbParams,
    Sampling, SearchConfig, Seeding, TailMode, TargetBit, Uarx18Mode,
};

fn trial_config() -> SearchConfig {
    SearchConfig {
        cipher: CipherParams {
            name: "salsa".to_owned(),
            mode_tag: "PNBsearch".to_owned(),
            comment: String::new(),
            key_size: KeySize::Bits256,
            total_rounds: HalfRounds::new(7.0).unwrap(),
            tail: TailMode::LastRoundModified(Uarx18Mode::Skip),
        },
        distinguisher: Distinguisher {
            fwd_rounds: HalfRounds::new(5.0).unwrap(),
            input_diff: vec![BitPos::new(7, 31)],
            output_mask: vec![BitPos::new(4, 7)],
        },
        sampling: Sampling {
            workers: 1,
            trials_per_worker: 1,
            seeding: Seeding::Deterministic(0),
        },
        pnb: PnbParams::new(0.35, vec![]).unwrap(),
    }
}

fn round_benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let state: salsa::State = rng.gen();

    let mut group = c.benchmark_group("salsa rounds");

    group.bench_function("eight forward rounds", |b| {
        b.iter(|| {
            let mut x = black_box(state);
            for i in 1..=8 {
                salsa::full_round(&mut x, i);
            }
            x
        })
    });

    group.bench_function("eight backward rounds", |b| {
        b.iter(|| {
            let mut x = black_box(state);
            for i in (1..=8).rev() {
                salsa::backward_full_round(&mut x, i);
            }
            x
        })
    });

    let cfg = trial_config();
    group.bench_function("one neutrality trial (7.5 rounds)", |b| {
        b.iter(|| run_trial(black_box(&cfg), TargetBit { word: 1, bit: 3 }, &mut rng))
    });

    group.finish();
}

criterion_group!(benches, round_benchmarks);
criterion_main!(benches);
