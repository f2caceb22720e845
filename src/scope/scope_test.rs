use std::time::Duration;

use tokio::time::sleep;

use super::*;
use crate::constants::READ_TIMEOUT;

#[tokio::test(start_paused = true)]
async fn test_run_returns_result_before_deadline() {
    let scope = CallScope::with_timeout(Duration::from_secs(5));

    let result = scope
        .run(async {
            sleep(Duration::from_secs(1)).await;
            Ok::<_, StoreError>(7)
        })
        .await;

    assert_eq!(result.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_run_fails_with_deadline_exceeded() {
    let scope = CallScope::with_timeout(Duration::from_secs(5));

    let result = scope
        .run(async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(7)
        })
        .await;

    match result {
        Err(StoreError::DeadlineExceeded(d)) => assert_eq!(d, Duration::from_secs(5)),
        other => panic!("Expected DeadlineExceeded, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_scope_waits_past_read_timeout() {
    let scope = CallScope::unbounded();
    assert!(scope.remaining().is_none());

    let result = scope
        .run(async {
            sleep(READ_TIMEOUT * 3).await;
            Ok::<_, StoreError>("late")
        })
        .await;

    assert_eq!(result.unwrap(), "late");
}

#[tokio::test]
async fn test_run_on_cancelled_scope_fails_fast() {
    let scope = CallScope::unbounded();
    scope.token().cancel();

    let result = scope.run(async { Ok::<_, StoreError>(()) }).await;

    assert!(matches!(result, Err(StoreError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_ensure_live_tracks_deadline_and_cancel() {
    let scope = CallScope::with_timeout(Duration::from_millis(30));
    assert!(scope.ensure_live().is_ok());

    sleep(Duration::from_millis(30)).await;
    assert!(matches!(
        scope.ensure_live(),
        Err(StoreError::DeadlineExceeded(d)) if d == Duration::from_millis(30)
    ));

    let unbounded = CallScope::unbounded();
    assert!(unbounded.ensure_live().is_ok());
    unbounded.token().cancel();
    assert!(matches!(unbounded.ensure_live(), Err(StoreError::Cancelled)));
}

#[tokio::test]
async fn test_guard_release_cancels_in_flight_call() {
    let scope = CallScope::unbounded();
    let mut guard = scope.guard();

    let in_flight = {
        let scope = scope.clone();
        tokio::spawn(async move { scope.run(futures::future::pending::<StoreResult<()>>()).await })
    };

    guard.release();

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(StoreError::Cancelled)));
}

#[test]
fn test_guard_drop_cancels_scope() {
    let scope = CallScope::unbounded();
    {
        let _guard = scope.guard();
    }
    assert!(scope.is_cancelled());
}

#[test]
fn test_disarmed_guard_leaves_scope_alive() {
    let scope = CallScope::unbounded();
    let mut guard = scope.guard();

    guard.disarm();
    assert!(!guard.is_armed());
    drop(guard);

    assert!(!scope.is_cancelled());
}

#[test]
fn test_release_is_idempotent() {
    let scope = CallScope::unbounded();
    let mut guard = scope.guard();

    guard.release();
    assert!(!guard.is_armed());
    guard.release();

    assert!(scope.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_read_scope_is_bounded_by_read_timeout() {
    let (scope, guard) = read_scope();

    assert_eq!(scope.timeout(), Some(READ_TIMEOUT));
    assert_eq!(scope.remaining(), Some(READ_TIMEOUT));
    assert!(guard.is_armed());
}

#[test]
fn test_watch_scopes_zero_timeout_is_unbounded() {
    let scopes = WatchScopes::new(Duration::ZERO);
    let (scope, guard) = scopes.acquire();

    assert!(scope.deadline().is_none());
    assert!(!guard.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_watch_scopes_positive_timeout_tracks_handle() {
    let scopes = WatchScopes::new(Duration::from_millis(250));
    let (scope, guard) = scopes.acquire();

    assert_eq!(scopes.timeout(), Duration::from_millis(250));
    assert_eq!(scope.remaining(), Some(Duration::from_millis(250)));
    assert!(guard.is_armed());

    drop(guard);
    assert!(scope.is_cancelled());
}
