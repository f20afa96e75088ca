//! Shared fixtures for the window integration tests
//!
//! - `SeriesHistory`: pages an ascending in-memory series backward, records
//!   every anchor it is asked for and the peak number of concurrent fetches
//! - `ChannelFeed`: a live feed driven by the test through an mpsc sender

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, StreamExt};
use time_window::{
    DataList, HistorySource, LiveFeed, ManualClock, NoLiveFeed, StreamEvent, TimeData,
    WindowConfig,
};

/// Wall clock used by windows under test.
pub const NOW: f64 = 1_000.0;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn record(time: f64) -> TimeData {
    TimeData::new(time).with("value", time)
}

pub struct SeriesHistory {
    series: Mutex<Vec<TimeData>>,
    page_size: usize,
    delay: Option<Duration>,
    fail_next: AtomicUsize,
    fail_at: Mutex<Option<f64>>,
    anchors: Mutex<Vec<Option<f64>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SeriesHistory {
    pub fn new(times: impl IntoIterator<Item = f64>, page_size: usize) -> Self {
        let mut series: Vec<TimeData> = times.into_iter().map(record).collect();
        series.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            series: Mutex::new(series),
            page_size,
            delay: None,
            fail_next: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            anchors: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Suspend every fetch for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Insert a record after any existing records with the same time.
    pub fn push(&self, data: TimeData) {
        let mut series = self.series.lock().unwrap();
        let at = series.partition_point(|r| r.time <= data.time);
        series.insert(at, data);
    }

    /// Fail the next `n` fetches.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail the next fetch anchored at `anchor`.
    pub fn fail_at(&self, anchor: f64) {
        *self.fail_at.lock().unwrap() = Some(anchor);
    }

    pub fn anchors(&self) -> Vec<Option<f64>> {
        self.anchors.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.anchors.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for SeriesHistory {
    async fn fetch_before(&self, anchor: Option<f64>) -> anyhow::Result<Vec<TimeData>> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.anchors.lock().unwrap().push(anchor);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing_anchor = {
            let mut fail_at = self.fail_at.lock().unwrap();
            let hit = anchor.is_some() && *fail_at == anchor;
            if hit {
                *fail_at = None;
            }
            hit
        };
        let failing = failing_anchor
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failing {
            anyhow::bail!("history unavailable");
        }

        let series = self.series.lock().unwrap();
        Ok(series
            .iter()
            .filter(|r| anchor.map_or(true, |a| r.time < a))
            .rev()
            .take(self.page_size)
            .cloned()
            .collect())
    }
}

pub struct ChannelFeed {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<StreamEvent>>>,
}

impl ChannelFeed {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded();
        let feed = Arc::new(Self {
            receiver: Mutex::new(Some(rx)),
        });
        (feed, tx)
    }
}

impl LiveFeed for ChannelFeed {
    fn subscribe(&self) -> BoxStream<'static, StreamEvent> {
        match self.receiver.lock().unwrap().take() {
            Some(rx) => rx.boxed(),
            None => stream::empty().boxed(),
        }
    }
}

pub fn window(history: &Arc<SeriesHistory>, clock: &Arc<ManualClock>) -> DataList {
    DataList::builder(history.clone())
        .live_feed(Arc::new(NoLiveFeed))
        .clock(clock.clone())
        .build()
}

pub fn window_with_config(
    history: &Arc<SeriesHistory>,
    clock: &Arc<ManualClock>,
    config: WindowConfig,
) -> DataList {
    DataList::builder(history.clone())
        .clock(clock.clone())
        .config(config)
        .build()
}

pub fn streaming_window(
    history: &Arc<SeriesHistory>,
    feed: &Arc<ChannelFeed>,
    clock: &Arc<ManualClock>,
) -> DataList {
    DataList::builder(history.clone())
        .live_feed(feed.clone())
        .clock(clock.clone())
        .build()
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW))
}

pub fn times(window: &DataList) -> Vec<f64> {
    window.to_vec().unwrap().iter().map(|r| r.time).collect()
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
