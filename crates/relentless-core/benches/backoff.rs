//! Benchmarks for inter-attempt delay calculation and the retry loop.
//!
//! Performance budgets:
//! - Single wait computation: **< 200ns**
//! - Jittered wait computation (seeded rng): **< 300ns**
//! - Full run of 10 zero-wait attempts: **< 50us**

use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use relentless_core::backoff::{compute_wait, compute_wait_with_rng};
use relentless_core::{AttemptError, Failure, RetryConfig, RetryOptions, execute};

fn config(linear: bool, jitter: bool, max_wait_ms: Option<u64>) -> RetryConfig {
    let mut options = RetryOptions::new()
        .with_min_wait(Duration::from_millis(100))
        .with_growth_factor(2.0)
        .with_linear_growth(linear)
        .with_jitter(jitter);
    if let Some(max) = max_wait_ms {
        options = options.with_max_wait(Duration::from_millis(max));
    }
    options.resolve().expect("benchmark options are valid")
}

// =============================================================================
// Wait computation
// =============================================================================

fn bench_compute_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_compute_wait");

    let linear = config(true, false, None);
    let exponential = config(false, false, None);
    let capped = config(true, false, Some(30_000));

    for retries in [0_u32, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("linear", retries), &retries, |b, &n| {
            b.iter(|| compute_wait(None, black_box(n), &linear));
        });
        group.bench_with_input(
            BenchmarkId::new("exponential", retries),
            &retries,
            |b, &n| {
                b.iter(|| compute_wait(None, black_box(n), &exponential));
            },
        );
        group.bench_with_input(BenchmarkId::new("capped", retries), &retries, |b, &n| {
            let remaining = Some(Duration::from_secs(10));
            b.iter(|| compute_wait(black_box(remaining), black_box(n), &capped));
        });
    }

    group.finish();
}

fn bench_jitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_jitter");
    let jittered = config(true, true, Some(60_000));

    for retries in [1_u32, 8, 32] {
        group.bench_with_input(BenchmarkId::new("seeded", retries), &retries, |b, &n| {
            let mut rng = StdRng::seed_from_u64(0x5EED);
            b.iter(|| compute_wait_with_rng(None, black_box(n), &jittered, &mut rng));
        });
    }

    group.bench_function("thread_rng", |b| {
        b.iter(|| compute_wait(None, black_box(8), &jittered));
    });

    group.finish();
}

// =============================================================================
// Retry loop overhead
// =============================================================================

fn bench_engine_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_loop");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");

    for attempts in [1_u32, 10] {
        let config = RetryOptions::new()
            .with_max_attempts(attempts)
            .with_min_wait(Duration::ZERO)
            .with_allow_duplicate_errors(true)
            .resolve()
            .expect("benchmark options are valid");

        group.bench_with_input(
            BenchmarkId::new("always_failing", attempts),
            &config,
            |b, config| {
                b.to_async(&runtime).iter(|| async {
                    let result = execute(config, |_| async {
                        Err::<(), _>(Failure::from(AttemptError::msg("down")))
                    })
                    .await;
                    black_box(result.context().attempts())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compute_wait, bench_jitter, bench_engine_loop);
criterion_main!(benches);
