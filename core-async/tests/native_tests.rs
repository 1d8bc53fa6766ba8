//! Integration tests for the executor facade.

use core_async::{runtime, sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[core_async::test]
async fn runtime_handle_available_inside_block_on() {
    assert!(runtime::try_current().is_some());
}

#[test]
fn runtime_handle_missing_outside_runtime() {
    assert!(runtime::try_current().is_none());
}

#[core_async::test]
async fn unbounded_channel_preserves_send_order() {
    let (tx, mut rx) = sync::mpsc::unbounded_channel();

    for i in 0..100u64 {
        tx.send(i).unwrap();
    }
    drop(tx);

    let mut received = Vec::new();
    while let Some(value) = rx.recv().await {
        received.push(value);
    }

    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

#[core_async::test]
async fn oneshot_delivers_flush_ack() {
    let (tx, rx) = sync::oneshot::channel();

    task::spawn(async move {
        time::sleep(time::Duration::from_millis(10)).await;
        tx.send(42).unwrap();
    });

    let result = rx.await.unwrap();
    assert_eq!(result, 42);
}

#[core_async::test]
async fn broadcast_reaches_every_subscriber() {
    let (tx, mut first) = sync::broadcast::channel(8);
    let mut second = tx.subscribe();

    tx.send("ready").unwrap();

    assert_eq!(first.recv().await.unwrap(), "ready");
    assert_eq!(second.recv().await.unwrap(), "ready");
}

#[core_async::test]
async fn timeout_elapses_on_slow_future() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn interval_ticks_repeatedly() {
    let mut interval = time::interval(time::Duration::from_millis(10));

    let start = time::Instant::now();

    // First tick completes immediately
    interval.tick().await;

    for _ in 0..3 {
        interval.tick().await;
    }

    assert!(start.elapsed() >= time::Duration::from_millis(30));
}

#[core_async::test]
async fn mutex_across_tasks() {
    let counter = Arc::new(sync::Mutex::new(0));
    let mut handles = vec![];

    for _ in 0..10 {
        let counter_clone = counter.clone();
        handles.push(task::spawn(async move {
            let mut guard = counter_clone.lock().await;
            *guard += 1;
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.lock().await, 10);
}

#[test]
fn now_millis_is_after_2020() {
    assert!(time::now_millis() > 1_577_836_800_000);
}
