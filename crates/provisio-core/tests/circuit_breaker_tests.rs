//! Circuit breaker state machine tests
//!
//! All tests run on a paused clock so cool-downs are exact.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{breaker_config, MockDependency, RemoteError};
use provisio_core::breaker::{CircuitBreaker, CircuitOpenError, CircuitState};
use test_case::test_case;
use tokio::sync::oneshot;

#[derive(Debug)]
enum CallError {
    Open(CircuitOpenError),
    Remote(RemoteError),
}

impl From<CircuitOpenError> for CallError {
    fn from(err: CircuitOpenError) -> Self {
        CallError::Open(err)
    }
}

async fn call(breaker: &CircuitBreaker, dependency: &MockDependency) -> Result<String, CallError> {
    breaker
        .call(|| async { dependency.call().await.map_err(CallError::Remote) })
        .await
}

#[test_case(1 ; "threshold one")]
#[test_case(3 ; "threshold three")]
#[test_case(5 ; "threshold five")]
#[tokio::test(start_paused = true)]
async fn test_opens_after_exactly_k_failures(k: u32) {
    let breaker = CircuitBreaker::new("provisioning-api", breaker_config(k, 1, 1000)).unwrap();
    let dependency = MockDependency::failing(RemoteError::unavailable());

    for _ in 1..k {
        assert!(matches!(
            call(&breaker, &dependency).await,
            Err(CallError::Remote(_))
        ));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    assert!(matches!(
        call(&breaker, &dependency).await,
        Err(CallError::Remote(_))
    ));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(dependency.calls(), k);

    // rejected without reaching the dependency
    for _ in 0..3 {
        assert!(matches!(
            call(&breaker, &dependency).await,
            Err(CallError::Open(_))
        ));
    }
    assert_eq!(dependency.calls(), k);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_errors_count_as_failures() {
    let breaker = CircuitBreaker::new("provisioning-api", breaker_config(2, 1, 1000)).unwrap();
    let dependency = MockDependency::failing(RemoteError::bad_request());

    call(&breaker, &dependency).await.unwrap_err();
    call(&breaker, &dependency).await.unwrap_err();

    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_reset_timeout_scenario() {
    let breaker = CircuitBreaker::new("provisioning-api", breaker_config(2, 1, 100)).unwrap();
    let failing = MockDependency::failing(RemoteError::unavailable());
    let healthy = MockDependency::healthy("ws-1");

    call(&breaker, &failing).await.unwrap_err();
    call(&breaker, &failing).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_millis(50)).await;
    match call(&breaker, &healthy).await {
        Err(CallError::Open(err)) => {
            assert_eq!(err.breaker, "provisioning-api");
            assert_eq!(err.retry_after, Some(Duration::from_millis(50)));
        }
        other => panic!("expected CircuitOpen at 50ms, got {:?}", other),
    }
    assert_eq!(healthy.calls(), 0);

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(call(&breaker, &healthy).await.unwrap(), "ws-1");
    assert_eq!(healthy.calls(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_rejected_during_probe() {
    let breaker =
        Arc::new(CircuitBreaker::new("provisioning-api", breaker_config(1, 1, 100)).unwrap());
    let failing = MockDependency::failing(RemoteError::unavailable());
    call(&breaker, &failing).await.unwrap_err();
    tokio::time::advance(Duration::from_millis(100)).await;

    let (release_tx, release_rx) = oneshot::channel::<()>();
    let probe = tokio::spawn({
        let breaker = Arc::clone(&breaker);
        async move {
            breaker
                .call(|| async move {
                    release_rx.await.ok();
                    Ok::<_, CallError>("probed")
                })
                .await
        }
    });

    while !breaker.snapshot().probe_in_flight {
        tokio::task::yield_now().await;
    }
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let bystander = Arc::new(AtomicU32::new(0));
    for _ in 0..5 {
        let invoked = Arc::clone(&bystander);
        let result = breaker
            .call(|| async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>("bystander")
            })
            .await;
        match result {
            Err(CallError::Open(err)) => assert!(err.probe_in_flight),
            other => panic!("expected rejection during probe, got {:?}", other),
        }
    }
    assert_eq!(bystander.load(Ordering::SeqCst), 0);

    release_tx.send(()).unwrap();
    assert_eq!(probe.await.unwrap().unwrap(), "probed");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().rejected_calls, 5);
}

#[tokio::test(start_paused = true)]
async fn test_success_threshold_closes_with_zero_failures() {
    let breaker = CircuitBreaker::new("provisioning-api", breaker_config(1, 3, 100)).unwrap();
    let failing = MockDependency::failing(RemoteError::unavailable());
    let healthy = MockDependency::healthy("ok");

    call(&breaker, &failing).await.unwrap_err();
    tokio::time::advance(Duration::from_millis(100)).await;

    for expected in 1..3 {
        call(&breaker, &healthy).await.unwrap();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.success_count, expected);
        assert!(!snapshot.probe_in_flight);
    }

    call(&breaker, &healthy).await.unwrap();
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.success_count, 0);
}
