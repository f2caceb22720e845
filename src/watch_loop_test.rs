use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tonic::async_trait;
use tracing_test::traced_test;

use crate::spawn_watch_loop;
use crate::KeyChange;
use crate::KeyWatcher;
use crate::StoreError;
use crate::StoreResult;

/// Replays a script, then waits forever
struct ScriptedWatcher {
    script: VecDeque<StoreResult<KeyChange>>,
}

impl ScriptedWatcher {
    fn boxed(script: Vec<StoreResult<KeyChange>>) -> Box<dyn KeyWatcher> {
        Box::new(Self {
            script: script.into(),
        })
    }
}

#[async_trait]
impl KeyWatcher for ScriptedWatcher {
    async fn next(&mut self) -> StoreResult<KeyChange> {
        match self.script.pop_front() {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }

    fn prefix(&self) -> &str {
        "/data"
    }
}

#[tokio::test]
#[traced_test]
async fn test_changes_are_forwarded_in_order() {
    let (change_tx, mut change_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let watcher = ScriptedWatcher::boxed(vec![
        Ok(KeyChange::put("/data/3", "1")),
        Ok(KeyChange::removed("/data/3")),
    ]);

    let _handle = spawn_watch_loop(watcher, change_tx, shutdown_rx);

    assert_eq!(change_rx.recv().await, Some(KeyChange::put("/data/3", "1")));
    assert_eq!(change_rx.recv().await, Some(KeyChange::removed("/data/3")));
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_signal_ends_loop_cleanly() {
    let (change_tx, _change_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = spawn_watch_loop(ScriptedWatcher::boxed(vec![]), change_tx, shutdown_rx);

    shutdown_tx.send(()).unwrap();

    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(logs_contain("watch loop shutdown signal received"));
}

#[tokio::test]
#[traced_test]
async fn test_dropped_receiver_ends_loop_cleanly() {
    let (change_tx, change_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = spawn_watch_loop(ScriptedWatcher::boxed(vec![]), change_tx, shutdown_rx);

    drop(change_rx);

    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
#[traced_test]
async fn test_watch_error_ends_loop_with_error() {
    let (change_tx, mut change_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let watcher = ScriptedWatcher::boxed(vec![
        Ok(KeyChange::put("/data/1", "a")),
        Err(StoreError::WatchCanceled {
            prefix: "/data".to_string(),
            reason: "compacted".to_string(),
        }),
        Ok(KeyChange::put("/data/2", "never")),
    ]);

    let handle = spawn_watch_loop(watcher, change_tx, shutdown_rx);

    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(StoreError::WatchCanceled { .. })));
    assert_eq!(change_rx.recv().await, Some(KeyChange::put("/data/1", "a")));
    assert_eq!(change_rx.recv().await, None);
    assert!(logs_contain("watch loop stopped"));
}

/// Produces the same change forever
struct EndlessWatcher;

#[async_trait]
impl KeyWatcher for EndlessWatcher {
    async fn next(&mut self) -> StoreResult<KeyChange> {
        Ok(KeyChange::put("/data/1", "a"))
    }

    fn prefix(&self) -> &str {
        "/data"
    }
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_observed_while_receiver_is_full() {
    let (change_tx, change_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = spawn_watch_loop(Box::new(EndlessWatcher), change_tx, shutdown_rx);

    // Receiver alive but never drained: the loop parks on a full channel
    tokio::task::yield_now().await;
    shutdown_tx.send(()).unwrap();

    let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(logs_contain("watch loop shutdown signal received"));
    drop(change_rx);
}
