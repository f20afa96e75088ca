//! Streaming tests for the time window
//!
//! Drives a window through a controllable live feed:
//! - Catch-up load on connect, then live appends
//! - Records that arrive before the catch-up finishes
//! - Stop semantics and ignored late records
//! - Malformed and out-of-order live records

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use time_window::{LatestTime, RequestOptions, StreamEvent, TimeRange, WindowError};

#[tokio::test]
async fn test_stream_on_empty_window_goes_live() {
    init_tracing();
    let history = Arc::new(SeriesHistory::new(Vec::<f64>::new(), 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());

    w.start_streaming().unwrap();
    assert!(w.is_streaming());
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    // Catch-up on an empty window is one unexpanded, unbounded fetch
    assert_eq!(history.anchors(), vec![None]);

    tx.unbounded_send(StreamEvent::record(&record(100.0))).unwrap();
    wait_until(|| w.last_time() == Ok(Some(100.0))).await;
    assert_eq!(times(&w), vec![100.0]);
    assert_eq!(w.metrics().records_appended, 1);
}

#[tokio::test]
async fn test_catch_up_fills_gap_before_live() {
    let history = Arc::new(SeriesHistory::new((0..=5).map(f64::from), 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());
    w.request_data(None, RequestOptions::default()).await.unwrap();
    assert_eq!(w.latest_time(), Some(LatestTime::Until(5.0)));

    history.push(record(6.0));
    history.push(record(7.0));
    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    assert_eq!(times(&w), (0..=7).map(f64::from).collect::<Vec<_>>());
    assert_eq!(history.anchors(), vec![None, Some(NOW)]);

    tx.unbounded_send(StreamEvent::record(&record(8.0))).unwrap();
    wait_until(|| w.len() == 9).await;
    assert_eq!(w.last_time(), Ok(Some(8.0)));
}

#[tokio::test]
async fn test_early_records_follow_catch_up() {
    let history = Arc::new(SeriesHistory::new([10.0, 20.0, 30.0], 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());

    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::record(&record(100.0))).unwrap();
    tx.unbounded_send(StreamEvent::record(&record(110.0))).unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();

    wait_until(|| w.len() == 5).await;
    assert_eq!(times(&w), vec![10.0, 20.0, 30.0, 100.0, 110.0]);
    assert_eq!(w.latest_time(), Some(LatestTime::Live));
}

#[tokio::test]
async fn test_stop_pins_latest_and_ignores_records() {
    let history = Arc::new(SeriesHistory::new([1.0, 2.0], 10));
    let (feed, tx) = ChannelFeed::new();
    let clock = clock();
    let w = streaming_window(&history, &feed, &clock);

    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    clock.set(1_234.0);
    w.stop_streaming();
    assert!(!w.is_streaming());
    assert_eq!(w.latest_time(), Some(LatestTime::Until(1_234.0)));

    // The feed may already be closed; either way nothing is appended
    let _ = tx.unbounded_send(StreamEvent::record(&record(50.0)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(times(&w), vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_stop_without_stream_pins_watermark() {
    let history = Arc::new(SeriesHistory::new([1.0, 2.0], 10));
    let clock = clock();
    let w = window(&history, &clock);
    w.request_data(None, RequestOptions::default()).await.unwrap();
    assert_eq!(w.latest_time(), Some(LatestTime::Until(2.0)));

    clock.set(1_500.0);
    w.stop_streaming();
    assert!(!w.is_streaming());
    assert_eq!(w.latest_time(), Some(LatestTime::Until(1_500.0)));
}

#[tokio::test]
async fn test_start_streaming_twice_is_noop() {
    let history = Arc::new(SeriesHistory::new([1.0], 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());

    w.start_streaming().unwrap();
    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    assert_eq!(history.fetch_count(), 1);
}

#[tokio::test]
async fn test_bad_live_records_are_skipped() {
    let history = Arc::new(SeriesHistory::new([10.0, 20.0, 30.0], 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());

    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    tx.unbounded_send(StreamEvent::Record("not a record".to_string()))
        .unwrap();
    tx.unbounded_send(StreamEvent::record(&record(25.0))).unwrap();
    tx.unbounded_send(StreamEvent::record(&record(40.0))).unwrap();
    wait_until(|| w.last_time() == Ok(Some(40.0))).await;

    assert_eq!(times(&w), vec![10.0, 20.0, 30.0, 40.0]);
    assert_eq!(w.metrics().records_skipped, 2);
}

#[tokio::test]
async fn test_live_empty_window_skips_range_fetch() {
    let history = Arc::new(SeriesHistory::new(Vec::<f64>::new(), 10));
    let (feed, tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());

    w.start_streaming().unwrap();
    tx.unbounded_send(StreamEvent::Connected).unwrap();
    wait_until(|| w.latest_time() == Some(LatestTime::Live)).await;

    let loaded = w
        .request_data(Some(TimeRange::new(0.0, 10.0)), RequestOptions::default())
        .await;
    assert_eq!(loaded, Ok(false));
    assert_eq!(history.fetch_count(), 1);
}

#[tokio::test]
async fn test_absorbed_window_cannot_stream() {
    let history = Arc::new(SeriesHistory::new([1.0], 10));
    let (feed, _tx) = ChannelFeed::new();
    let w = streaming_window(&history, &feed, &clock());
    let other = streaming_window(&history, &feed, &clock());

    w.merge_last(&other).unwrap();
    assert_eq!(other.start_streaming(), Err(WindowError::UsedAfterDestroy));
}
