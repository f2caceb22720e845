use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tonic::async_trait;
use tracing_test::traced_test;

use super::*;
use crate::constants::READ_TIMEOUT;
use crate::ReadApi;
use crate::StoreError;

fn found(
    key: &[u8],
    value: &str,
) -> RangeResult {
    RangeResult {
        kvs: vec![KeyValue::new(key, value)],
        count: 1,
        revision: 3,
    }
}

/// Transport that never answers within the read timeout
struct StalledKv;

#[async_trait]
impl ModernKv for StalledKv {
    async fn range(
        &self,
        _scope: &CallScope,
        key: &[u8],
    ) -> StoreResult<RangeResult> {
        sleep(READ_TIMEOUT + Duration::from_secs(1)).await;
        Ok(found(key, "too late"))
    }
}

#[tokio::test]
#[traced_test]
async fn test_get_returns_first_value() {
    let mut kv = MockModernKv::new();
    kv.expect_range()
        .withf(|scope, key| scope.timeout() == Some(READ_TIMEOUT) && key == b"/data/3")
        .times(1)
        .returning(|_, key| Ok(found(key, "1")));

    let api = ModernReadApi::new(Arc::new(kv));

    assert_eq!(api.get("/data/3").await.unwrap(), Some("1".to_string()));
}

#[tokio::test]
#[traced_test]
async fn test_get_empty_result_is_absent() {
    let mut kv = MockModernKv::new();
    kv.expect_range().times(1).returning(|_, _| {
        Ok(RangeResult {
            revision: 5,
            ..Default::default()
        })
    });

    let api = ModernReadApi::new(Arc::new(kv));

    assert_eq!(api.get("/block/3").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_count_without_kvs_is_absent() {
    let mut kv = MockModernKv::new();
    kv.expect_range().returning(|_, _| {
        Ok(RangeResult {
            kvs: vec![],
            count: 1,
            revision: 5,
        })
    });

    let api = ModernReadApi::new(Arc::new(kv));

    assert_eq!(api.get("/data/3").await.unwrap(), None);
}

#[tokio::test]
#[traced_test]
async fn test_get_transport_error_is_surfaced() {
    let mut kv = MockModernKv::new();
    kv.expect_range()
        .times(1)
        .returning(|_, _| Err(tonic::Status::unavailable("no leader").into()));

    let api = ModernReadApi::new(Arc::new(kv));

    match api.get("/data/3").await {
        Err(StoreError::Rpc(status)) => assert_eq!(status.code(), tonic::Code::Unavailable),
        other => panic!("Expected rpc error, got {other:?}"),
    }
    assert!(logs_contain("modern read failed"));
}

#[tokio::test]
async fn test_get_rejects_empty_key() {
    let mut kv = MockModernKv::new();
    kv.expect_range().times(0);

    let api = ModernReadApi::new(Arc::new(kv));

    assert!(matches!(api.get("").await, Err(StoreError::InvalidKey(_))));
}

#[tokio::test(start_paused = true)]
async fn test_get_exceeding_read_timeout_fails() {
    let api = ModernReadApi::new(Arc::new(StalledKv));

    let err = api.get("/data/3").await.unwrap_err();

    assert!(matches!(err, StoreError::DeadlineExceeded(d) if d == READ_TIMEOUT));
}

#[tokio::test]
async fn test_get_scope_released_after_call() {
    let scopes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = scopes.clone();
    let mut kv = MockModernKv::new();
    kv.expect_range().returning(move |scope, key| {
        recorded.lock().push(scope.clone());
        Ok(found(key, "1"))
    });

    let api = ModernReadApi::new(Arc::new(kv));
    api.get("/data/3").await.unwrap();

    assert!(scopes.lock()[0].is_cancelled());
}
