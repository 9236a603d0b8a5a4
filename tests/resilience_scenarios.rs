//! End-to-end resilience scenarios on simulated time

mod common;

use common::{breaker_config, observed_executor};
use resilience_core::adapters::broker::{BrokerConsumer, BrokerProducer, InMemoryBroker};
use resilience_core::adapters::{Cache, InMemoryCacheService};
use resilience_core::resilience::{
    BackoffPolicy, BootstrapConfig, CircuitState, ConnectionBootstrapper, ExecuteError,
};
use resilience_core::ResilienceError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn breaker_opens_rejects_probes_and_recovers() {
    let (executor, observer) = observed_executor("store", breaker_config(3, Duration::from_secs(10)));
    let invocations = AtomicU32::new(0);

    // Three consecutive failures open the circuit
    for _ in 0..3 {
        let result = executor
            .execute(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection reset by peer")
            })
            .await;
        assert!(matches!(result, Err(ExecuteError::OperationFailed(_))));
    }
    assert_eq!(executor.breaker().state(), CircuitState::Open);

    // The fourth call is rejected without touching the dependency
    let result = executor
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(result.unwrap_err().is_rejected());
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(10)).await;

    // The probe succeeds and closes the circuit
    let probe = executor
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>("pong")
        })
        .await;
    assert_eq!(probe.unwrap(), "pong");
    assert_eq!(executor.breaker().state(), CircuitState::Closed);

    for _ in 0..5 {
        executor
            .execute(|| async { Ok::<_, &str>(()) })
            .await
            .unwrap();
    }

    assert_eq!(
        observer.transitions(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
    assert_eq!(observer.rejection_count(), 1);

    let metrics = executor.breaker().metrics();
    assert_eq!(metrics.failure_count, 3);
    assert_eq!(metrics.success_count, 6);
    assert_eq!(metrics.rejected_count, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_restarts_cooldown() {
    let (executor, observer) = observed_executor("cache", breaker_config(1, Duration::from_secs(5)));

    let _ = executor.execute(|| async { Err::<(), _>("down") }).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    let _ = executor.execute(|| async { Err::<(), _>("still down") }).await;
    assert_eq!(executor.breaker().state(), CircuitState::Open);

    // Cooldown restarted at the failed probe
    tokio::time::advance(Duration::from_secs(4)).await;
    let rejected = executor.execute(|| async { Ok::<_, &str>(()) }).await;
    assert!(rejected.unwrap_err().is_rejected());

    tokio::time::advance(Duration::from_secs(1)).await;
    executor.execute(|| async { Ok::<_, &str>(()) }).await.unwrap();

    assert_eq!(
        observer.transitions(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cache_bootstraps_through_flaky_dial_then_serves() {
    let backend = InMemoryCacheService::new();
    let dials = AtomicU32::new(0);
    let bootstrapper = ConnectionBootstrapper::new(
        "cache",
        BootstrapConfig {
            max_attempts: 5,
            backoff: BackoffPolicy::new(Duration::from_millis(200)).with_multiplier(2.0),
            timeout: Duration::from_secs(1),
        },
    );

    let started = Instant::now();
    let service = bootstrapper
        .connect(&CancellationToken::new(), || {
            let attempt = dials.fetch_add(1, Ordering::SeqCst) + 1;
            let backend = backend.clone();
            async move {
                if attempt <= 2 {
                    Err("connection refused")
                } else {
                    Ok(backend)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(dials.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(600));

    let (executor, _) = observed_executor("cache", breaker_config(3, Duration::from_secs(10)));
    let cache = Cache::new(service, executor);
    cache.set("greeting", "hello", Duration::from_secs(60)).await.unwrap();
    assert_eq!(cache.get("greeting").await.unwrap().as_deref(), Some("hello"));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(cache.get("greeting").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_exhaustion_is_unavailable() {
    let bootstrapper = ConnectionBootstrapper::new(
        "store",
        BootstrapConfig {
            max_attempts: 3,
            backoff: BackoffPolicy::new(Duration::from_secs(1)),
            timeout: Duration::from_secs(1),
        },
    );

    let err = bootstrapper
        .connect(&CancellationToken::new(), || async {
            Err::<InMemoryCacheService, _>("no route to host")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ResilienceError::BootstrapExhausted { attempts: 3, .. }));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test(start_paused = true)]
async fn consumer_survives_broker_outage() {
    let broker = InMemoryBroker::new("events");
    let (producer_exec, _) = observed_executor("broker-producer", breaker_config(3, Duration::from_secs(10)));
    let (consumer_exec, consumer_events) =
        observed_executor("broker-consumer", breaker_config(2, Duration::from_secs(3)));
    let producer = BrokerProducer::new(broker.clone(), producer_exec);
    let consumer = BrokerConsumer::new(
        broker.clone(),
        consumer_exec,
        Duration::from_secs(1),
        Duration::from_millis(500),
    );
    let cancel = CancellationToken::new();

    for n in 0..3 {
        producer
            .produce(&cancel, "tenant-1", format!("{{\"seq\":{n}}}"))
            .await
            .unwrap();
    }

    // Outage for the first five seconds of consumption
    broker.fail_fetches(true);
    let outage = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        outage.fail_fetches(false);
    });

    let received = parking_lot::Mutex::new(Vec::new());
    consumer
        .consume(&cancel, |message| {
            let value: serde_json::Value = message.decode_json().expect("json payload");
            received.lock().push(value["seq"].as_u64().unwrap_or_default());
            if received.lock().len() == 3 {
                cancel.cancel();
            }
            async { Ok::<_, String>(()) }
        })
        .await
        .unwrap();

    assert_eq!(*received.lock(), [0, 1, 2]);
    assert_eq!(broker.acked().await.len(), 3);
    assert!(consumer_events
        .transitions()
        .contains(&(CircuitState::Closed, CircuitState::Open)));
    assert_eq!(consumer.breaker().state(), CircuitState::Closed);
}
