use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resilience_core::resilience::{execute, BackoffPolicy, CircuitBreaker, CircuitBreakerConfig};
use std::time::Duration;

fn benchmark_allow_and_record(c: &mut Criterion) {
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());

    c.bench_function("breaker_allow_success", |b| {
        b.iter(|| {
            if let Ok(permit) = breaker.allow() {
                breaker.on_success(black_box(permit));
            }
        })
    });
}

fn benchmark_rejection(c: &mut Criterion) {
    let breaker = CircuitBreaker::new("bench-open", CircuitBreakerConfig::default());
    breaker.force_open();

    c.bench_function("breaker_reject_open", |b| {
        b.iter(|| black_box(breaker.allow().is_err()))
    });
}

fn benchmark_guarded_call(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let breaker = CircuitBreaker::new("bench-exec", CircuitBreakerConfig::default());

    c.bench_function("execute_guarded_call", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result = execute(&breaker, || async { Ok::<_, std::io::Error>(black_box(7)) }).await;
                black_box(result.is_ok())
            })
        })
    });
}

fn benchmark_backoff(c: &mut Criterion) {
    let policy = BackoffPolicy::default().with_jitter(0.2);

    c.bench_function("backoff_delay_jittered", |b| {
        b.iter(|| black_box(policy.delay(black_box(6))))
    });

    let capped = BackoffPolicy::new(Duration::from_millis(100))
        .with_multiplier(2.0)
        .with_max_delay(Duration::from_secs(30));
    c.bench_function("backoff_delay_nominal", |b| {
        b.iter(|| black_box(capped.nominal_delay(black_box(12))))
    });
}

criterion_group!(
    benches,
    benchmark_allow_and_record,
    benchmark_rejection,
    benchmark_guarded_call,
    benchmark_backoff
);
criterion_main!(benches);
