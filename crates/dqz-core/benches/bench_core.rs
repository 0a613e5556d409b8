// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — dqz-core
//
// Measures the pure scoring path hit on every finished attempt.
// Run: cargo bench -p dqz-core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dqz_core::reward::{compute_payout, running_tally, scale_progression};
use dqz_core::{apply_delta, AnswerOutcome, RewardStep, TerminationReason};

fn table(len: usize) -> Vec<RewardStep> {
    (0..len)
        .map(|i| RewardStep {
            question_index: i as u32,
            correct_reward: 10 * (i as u64 + 1),
        })
        .collect()
}

fn bench_compute_payout(c: &mut Criterion) {
    let mut group = c.benchmark_group("reward/compute_payout");
    for len in [5usize, 15, 50] {
        let progression = table(len);
        let outcomes = vec![AnswerOutcome::Correct; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                black_box(compute_payout(
                    &progression,
                    5,
                    &outcomes,
                    TerminationReason::CompletedAll,
                ))
            })
        });
    }
    group.finish();
}

fn bench_running_tally(c: &mut Criterion) {
    let progression = table(15);
    let outcomes: Vec<AnswerOutcome> = (0..15)
        .map(|i| {
            if i % 3 == 0 {
                AnswerOutcome::Incorrect
            } else {
                AnswerOutcome::Correct
            }
        })
        .collect();
    c.bench_function("reward/running_tally", |b| {
        b.iter(|| black_box(running_tally(&progression, 5, &outcomes)))
    });
}

fn bench_scale_progression(c: &mut Criterion) {
    let progression = table(15);
    c.bench_function("reward/scale_progression", |b| {
        b.iter(|| black_box(scale_progression(&progression, 1_337)))
    });
}

fn bench_apply_delta(c: &mut Criterion) {
    c.bench_function("wallet/apply_delta", |b| {
        b.iter(|| black_box(apply_delta(black_box(1_900), black_box(200))))
    });
}

criterion_group!(
    benches,
    bench_compute_payout,
    bench_running_tally,
    bench_scale_progression,
    bench_apply_delta
);
criterion_main!(benches);
