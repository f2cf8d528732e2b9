use futures_util::stream::{self, StreamExt};
use hotseq::seq::{from_iter, iterate};
use hotseq::{HotStream, HotStreamConfig, RunState, SeqExt, StreamError};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};

#[tokio::test]
async fn test_connect_captures_all_elements() {
    let hot = from_iter(0..2).hot_stream().unwrap();
    let captured: Vec<i32> = hot.connect().collect().await;
    assert_eq!(captured, vec![0, 1]);

    hot.join().await.unwrap();
    assert_eq!(hot.run_state(), RunState::Stopped);
    assert!(hot.is_finished());
    assert_eq!(hot.failure(), None);
}

#[tokio::test]
async fn test_production_runs_without_consumers() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let source = from_iter(0..10).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let hot = HotStream::start(source, HotStreamConfig::new().unbounded(), &Handle::current()).unwrap();
    hot.join().await.unwrap();

    assert_eq!(pulled.load(Ordering::SeqCst), 10);
    assert_eq!(hot.metrics().queue.length, 10);
    assert_eq!(hot.connect().collect::<Vec<_>>().await, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_primed_start_waits_for_first_element() {
    let hot = iterate(0u64, |n| n + 1).primed_hot_stream().await.unwrap();
    let metrics = hot.metrics();
    assert!(metrics.items_enqueued >= 1);
    assert_eq!(hot.connect().take(3).collect::<Vec<_>>().await, vec![0, 1, 2]);
    hot.stop();
}

#[tokio::test]
async fn test_primed_start_of_empty_source_returns() {
    let hot = stream::empty::<i32>().primed_hot_stream().await.unwrap();
    hot.join().await.unwrap();
    assert!(hot.connect().collect::<Vec<_>>().await.is_empty());
}

#[test]
fn test_production_on_separate_executor() {
    let producer_runtime = Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap();
    let consumer_runtime = Builder::new_current_thread().enable_all().build().unwrap();

    let hot = HotStream::start(
        from_iter(0..1000),
        HotStreamConfig::new().name("separate").bounded(16),
        producer_runtime.handle(),
    )
    .unwrap();

    let consumed: Vec<i32> = consumer_runtime.block_on(hot.connect().collect());
    assert_eq!(consumed, (0..1000).collect::<Vec<_>>());
    assert_eq!(hot.name(), "separate");
}

#[tokio::test]
async fn test_source_error_is_reported_by_try_connect() {
    let source = stream::iter(vec![Ok(1), Ok(2), Err("boom"), Ok(3)]);
    let hot = HotStream::try_start(source, HotStreamConfig::default(), &Handle::current()).unwrap();

    let results: Vec<_> = hot.try_connect().collect().await;
    assert_eq!(
        results,
        vec![Ok(1), Ok(2), Err(StreamError::SourceFailure("boom".to_string()))]
    );
    assert_eq!(hot.join().await, Err(StreamError::SourceFailure("boom".to_string())));
    assert_eq!(hot.failure(), Some(StreamError::SourceFailure("boom".to_string())));
    assert_eq!(hot.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_connect_ends_quietly_on_failure() {
    let source = stream::iter(vec![Ok(1), Err("broken pipe".to_string())]);
    let hot = HotStream::try_start(source, HotStreamConfig::default(), &Handle::current()).unwrap();

    assert_eq!(hot.connect().collect::<Vec<_>>().await, vec![1]);
    assert!(matches!(hot.failure(), Some(StreamError::SourceFailure(msg)) if msg == "broken pipe"));
}

#[tokio::test]
async fn test_panicking_source_becomes_failure() {
    let source = stream::iter(0..5).map(|i| {
        if i == 2 {
            panic!("exploded");
        }
        i
    });
    let hot = source.hot_stream().unwrap();

    assert_eq!(hot.connect().collect::<Vec<_>>().await, vec![0, 1]);
    assert_eq!(hot.join().await, Err(StreamError::SourceFailure("exploded".to_string())));
}

#[tokio::test]
async fn test_stop_unblocks_waiting_consumer() {
    let hot = stream::pending::<i32>().hot_stream().unwrap();
    let consumer = tokio::spawn(hot.connect().collect::<Vec<_>>());

    tokio::task::yield_now().await;
    hot.stop();

    let consumed = tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("consumer should end after stop")
        .unwrap();
    assert!(consumed.is_empty());

    assert_eq!(hot.join().await, Err(StreamError::Cancelled));
    assert_eq!(hot.run_state(), RunState::Stopped);
    assert_eq!(hot.failure(), None);
}

#[tokio::test]
async fn test_stop_keeps_buffered_elements() {
    let hot = HotStream::start(iterate(0u32, |n| n + 1), HotStreamConfig::new().bounded(4), &Handle::current()).unwrap();
    let mut first = hot.connect();
    assert_eq!(first.next().await, Some(0));

    hot.stop();
    hot.stop();
    assert_eq!(hot.join().await, Err(StreamError::Cancelled));

    let rest: Vec<u32> = first.collect().await;
    assert!(rest.len() <= 4);
    assert_eq!(rest, (1..=rest.len() as u32).collect::<Vec<_>>());
}

#[tokio::test]
#[serial]
async fn test_stop_interrupts_rate_shaping_wait() {
    let source = iterate(0u32, |n| n + 1).fixed_delay(Duration::from_secs(3600)).unwrap();
    let hot = source.hot_stream().unwrap();
    assert_eq!(hot.connect().next().await, Some(0));

    hot.stop();
    let outcome = tokio::time::timeout(Duration::from_secs(1), hot.join())
        .await
        .expect("production should end without waiting out the delay");
    assert_eq!(outcome, Err(StreamError::Cancelled));
}

#[tokio::test]
async fn test_multiple_connects_share_the_queue() {
    let hot = HotStream::start(from_iter(0..200), HotStreamConfig::new().unbounded(), &Handle::current()).unwrap();

    let a = tokio::spawn(hot.connect().collect::<Vec<_>>());
    let b = tokio::spawn(hot.connect().collect::<Vec<_>>());
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // Each element goes to exactly one view, in order within each view
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert!(b.windows(2).all(|w| w[0] < w[1]));
    let mut all: Vec<i32> = a.into_iter().chain(b).collect();
    all.sort_unstable();
    assert_eq!(all, (0..200).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_idle_view_does_not_block_other_views() {
    let delayed = stream::once(tokio::time::sleep(Duration::from_millis(50))).flat_map(|_| stream::iter(0..9));
    let hot = HotStream::start(delayed, HotStreamConfig::new().unbounded(), &Handle::current()).unwrap();

    let mut idle = hot.connect();
    assert!(tokio::time::timeout(Duration::from_millis(10), idle.next()).await.is_err());

    let other = tokio::time::timeout(Duration::from_secs(1), hot.connect().collect::<Vec<_>>())
        .await
        .expect("a second view must receive elements while the first sits idle");
    assert_eq!(other, (0..9).collect::<Vec<_>>());
    hot.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bounded_queue_applies_backpressure() {
    let hot = HotStream::start(iterate(0u64, |n| n + 1), HotStreamConfig::new().bounded(4), &Handle::current()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let metrics = hot.metrics();
    assert_eq!(metrics.queue.length, 4);
    assert_eq!(metrics.items_enqueued, 4);
    // One more element is held while waiting for room
    assert_eq!(metrics.items_pulled, 5);
    assert_eq!(metrics.run_state, RunState::Running);

    assert_eq!(hot.connect().take(6).collect::<Vec<_>>().await, vec![0, 1, 2, 3, 4, 5]);
    hot.stop();
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let err = HotStream::start(from_iter(0..3), HotStreamConfig::new().bounded(0), &Handle::current()).unwrap_err();
    assert!(matches!(err, StreamError::InvalidConfiguration(_)));

    let err = HotStream::start(from_iter(0..3), HotStreamConfig::new().name("  "), &Handle::current()).unwrap_err();
    assert!(matches!(err, StreamError::InvalidConfiguration(_)));
}

#[test]
fn test_hot_stream_outside_runtime_is_a_configuration_error() {
    let err = from_iter(0..3).hot_stream().unwrap_err();
    assert!(matches!(err, StreamError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_handles_are_distinct_and_cloneable() {
    let a = from_iter(0..1).hot_stream().unwrap();
    let b = from_iter(0..1).hot_stream().unwrap();
    assert_ne!(a.id(), b.id());

    let a2 = a.clone();
    assert_eq!(a.id(), a2.id());
    a2.stop();
    assert_eq!(a.run_state(), RunState::Stopped);
    b.join().await.unwrap();
}

#[tokio::test]
async fn test_dropping_every_handle_stops_production() {
    let hot = HotStream::start(iterate(0u32, |n| n + 1), HotStreamConfig::new().bounded(4), &Handle::current()).unwrap();
    let view = hot.connect();
    tokio::task::yield_now().await;

    let survivor = hot.clone();
    drop(hot);
    assert_eq!(survivor.run_state(), RunState::Running);
    drop(survivor);

    let drained = tokio::time::timeout(Duration::from_secs(1), view.collect::<Vec<_>>())
        .await
        .expect("the view must end once no handle is left");
    assert!(drained.len() <= 4);
    assert_eq!(drained, (0..drained.len() as u32).collect::<Vec<_>>());
}
