use futures_util::stream::StreamExt;
use hotseq::seq::{from_iter, iterate, Seq};
use hotseq::{HotStreamConfig, PausableHotStream, RunState, SeqExt, StreamError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_test::{assert_pending, task};

/// Counting source paced at one element per millisecond; `marker` holds the
/// last produced value
fn paced_counter(marker: Arc<AtomicU64>) -> Seq<u64> {
    iterate(1u64, |n| n + 1)
        .fixed_delay(Duration::from_millis(1))
        .unwrap()
        .inspect(move |n| marker.store(*n, Ordering::SeqCst))
        .boxed()
}

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_production() {
    let marker = Arc::new(AtomicU64::new(0));
    let hot = PausableHotStream::start(
        paced_counter(Arc::clone(&marker)),
        HotStreamConfig::new().unbounded(),
        &Handle::current(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(marker.load(Ordering::SeqCst) > 0);

    hot.pause().await;
    assert!(hot.is_paused());
    let frozen = marker.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(marker.load(Ordering::SeqCst), frozen);
    assert_eq!(hot.run_state(), RunState::Paused);

    hot.unpause();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(marker.load(Ordering::SeqCst) > frozen);
    assert_eq!(hot.run_state(), RunState::Running);

    hot.stop();
    assert_eq!(hot.join().await, Err(StreamError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_unpause_lose_nothing() {
    let hot = from_iter(0..200u32)
        .fixed_delay(Duration::from_millis(1))
        .unwrap()
        .pausable_hot_stream_with(HotStreamConfig::new().name("no-loss").bounded(8), &Handle::current())
        .unwrap();
    let consumer = tokio::spawn(hot.connect().collect::<Vec<_>>());

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(7)).await;
        hot.pause().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        hot.unpause();
    }

    let consumed = consumer.await.unwrap();
    assert_eq!(consumed, (0..200).collect::<Vec<_>>());
    assert_eq!(hot.metrics().pauses, 10);
}

#[tokio::test(start_paused = true)]
async fn test_pulled_element_is_held_across_pause() {
    let hot = PausableHotStream::start(from_iter(0..5), HotStreamConfig::new().bounded(1), &Handle::current()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Element 0 is queued and element 1 waits for room
    hot.pause().await;
    assert_eq!(hot.metrics().items_pulled, 2);

    let mut view = hot.connect();
    assert_eq!(view.next().await, Some(0));
    assert!(tokio::time::timeout(Duration::from_millis(50), view.next()).await.is_err());
    assert_eq!(hot.metrics().items_pulled, 2);

    hot.unpause();
    assert_eq!(view.collect::<Vec<_>>().await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_consumer_waits_while_paused() {
    let hot = PausableHotStream::start(iterate(0u32, |n| n + 1), HotStreamConfig::new().bounded(1), &Handle::current())
        .unwrap();
    // Requested before the task first runs, so it parks ahead of its first pull
    hot.pause().await;
    assert_eq!(hot.metrics().items_pulled, 0);

    let mut view = hot.connect();
    let mut waiting = task::spawn(view.next());
    assert_pending!(waiting.poll());
    assert_pending!(waiting.poll());
    drop(waiting);

    hot.unpause();
    assert_eq!(view.next().await, Some(0));
    hot.stop();
}

#[tokio::test]
async fn test_pause_and_unpause_are_idempotent() {
    let hot = iterate(0u32, |n| n + 1).primed_pausable_hot_stream().await.unwrap();

    hot.unpause();
    assert_eq!(hot.run_state(), RunState::Running);

    hot.pause().await;
    hot.pause().await;
    assert_eq!(hot.run_state(), RunState::Paused);
    assert_eq!(hot.metrics().pauses, 1);

    hot.unpause();
    hot.unpause();
    assert_eq!(hot.run_state(), RunState::Running);

    hot.stop();
}

#[tokio::test]
async fn test_stop_while_paused() {
    let hot = iterate(0u32, |n| n + 1)
        .primed_pausable_hot_stream_with(HotStreamConfig::new().bounded(4), Handle::current())
        .await
        .unwrap();
    hot.pause().await;

    let consumer = tokio::spawn(hot.connect().collect::<Vec<_>>());
    hot.stop();

    let outcome = tokio::time::timeout(Duration::from_secs(1), hot.join())
        .await
        .expect("a paused stream must still stop");
    assert_eq!(outcome, Err(StreamError::Cancelled));
    assert_eq!(hot.run_state(), RunState::Stopped);

    let buffered = consumer.await.unwrap();
    assert!(!buffered.is_empty());
    assert_eq!(buffered, (0..buffered.len() as u32).collect::<Vec<_>>());

    // Stopped is terminal
    hot.unpause();
    hot.pause().await;
    assert_eq!(hot.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_pause_after_exhaustion_returns() {
    let hot = from_iter(0..3).pausable_hot_stream().unwrap();
    hot.join().await.unwrap();

    hot.pause().await;
    assert_eq!(hot.run_state(), RunState::Stopped);
    assert_eq!(hot.connect().collect::<Vec<_>>().await, vec![0, 1, 2]);
}
