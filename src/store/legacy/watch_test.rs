use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tonic::async_trait;
use tracing_test::traced_test;

use super::*;
use crate::KeyChange;
use crate::KeyWatcher;
use crate::StoreError;

fn event(
    action: LegacyAction,
    key: &str,
    value: &str,
) -> LegacyResponse {
    LegacyResponse {
        action,
        node: LegacyNode {
            key: key.to_string(),
            value: value.to_string(),
            dir: false,
            modified_index: 7,
        },
        prev_node: None,
        index: 7,
    }
}

/// Replays queued results and records the scope of every call
struct ScriptedWatcher {
    script: VecDeque<StoreResult<LegacyResponse>>,
    scopes: Arc<Mutex<Vec<CallScope>>>,
}

#[async_trait]
impl LegacyWatcher for ScriptedWatcher {
    async fn next(
        &mut self,
        scope: &CallScope,
    ) -> StoreResult<LegacyResponse> {
        self.scopes.lock().push(scope.clone());
        match self.script.pop_front() {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }
}

fn scripted_keys(
    script: Vec<StoreResult<LegacyResponse>>,
    scopes: Arc<Mutex<Vec<CallScope>>>,
) -> MockLegacyKeysApi {
    let mut keys = MockLegacyKeysApi::new();
    let mut script = Some(script);
    keys.expect_watcher()
        .withf(|prefix, opts| prefix == "/data" && opts.recursive && opts.after_index == 0)
        .times(1)
        .returning(move |_, _| {
            Box::new(ScriptedWatcher {
                script: script.take().unwrap_or_default().into(),
                scopes: scopes.clone(),
            })
        });
    keys
}

#[tokio::test]
#[traced_test]
async fn test_next_translates_updates_and_removals() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(
        vec![
            Ok(event(LegacyAction::Set, "/data/3", "1")),
            Ok(event(LegacyAction::Delete, "/data/3", "")),
            Ok(event(LegacyAction::Create, "/data/4", "x")),
            Ok(event(LegacyAction::Expire, "/data/4", "")),
            Ok(event(LegacyAction::CompareAndDelete, "/data/5", "")),
        ],
        scopes,
    );
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::ZERO);

    assert_eq!(watcher.next().await.unwrap(), KeyChange::put("/data/3", "1"));
    assert_eq!(watcher.next().await.unwrap(), KeyChange::removed("/data/3"));
    assert_eq!(watcher.next().await.unwrap(), KeyChange::put("/data/4", "x"));
    assert_eq!(watcher.next().await.unwrap(), KeyChange::removed("/data/4"));
    assert_eq!(watcher.next().await.unwrap(), KeyChange::removed("/data/5"));
    assert_eq!(watcher.prefix(), "/data");
}

#[tokio::test]
async fn test_next_propagates_transport_error_and_keeps_subscription() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(
        vec![
            Err(LegacyError::new(LegacyErrorCode::EventIndexCleared, "The event in requested index is outdated and cleared", "", 3).into()),
            Ok(event(LegacyAction::Update, "/data/1", "2")),
        ],
        scopes,
    );
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::ZERO);

    match watcher.next().await {
        Err(StoreError::Legacy(e)) => assert_eq!(e.code, LegacyErrorCode::EventIndexCleared),
        other => panic!("Expected legacy error, got {other:?}"),
    }
    // Same subscription is reused after a failure.
    assert_eq!(watcher.next().await.unwrap(), KeyChange::put("/data/1", "2"));
}

#[tokio::test(start_paused = true)]
async fn test_successful_next_does_not_cancel_its_scope() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(vec![Ok(event(LegacyAction::Set, "/data/1", "a"))], scopes.clone());
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::from_secs(5));

    watcher.next().await.unwrap();

    let recorded = scopes.lock();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].timeout(), Some(Duration::from_secs(5)));
    assert!(!recorded[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_failed_next_cancels_its_scope() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(
        vec![Err(StoreError::ChannelClosed("long poll aborted".into()))],
        scopes.clone(),
    );
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::from_secs(5));

    assert!(watcher.next().await.is_err());

    assert!(scopes.lock()[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_next_times_out_when_configured() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(Vec::new(), scopes.clone());
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::from_millis(300));

    let err = watcher.next().await.unwrap_err();

    assert!(matches!(err, StoreError::DeadlineExceeded(d) if d == Duration::from_millis(300)));
    assert!(scopes.lock()[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_next_without_timeout_waits_indefinitely() {
    let scopes = Arc::new(Mutex::new(Vec::new()));
    let keys = scripted_keys(Vec::new(), scopes.clone());
    let mut watcher = LegacyKeyWatcher::new(&keys, "/data", Duration::ZERO);

    let pending = tokio::time::timeout(Duration::from_secs(3600), watcher.next()).await;

    assert!(pending.is_err(), "unbounded next should still be waiting");
    assert!(scopes.lock()[0].deadline().is_none());
}
