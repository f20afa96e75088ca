//! Windowed Time-Series Cache
//!
//! `DataList` wraps a `TimeList<TimeData>` with per-field extrema, the set of
//! field names seen so far, the `oldest_time` / `latest_time` watermarks and
//! change notifications. Loading lives in `loader`, live streaming in
//! `streaming`.
//!
//! A `DataList` is a cheap handle; clones share one window. The window
//! state sits behind a mutex that is only held for synchronous work, so
//! every mutation is atomic with respect to other operations on the same
//! window. Subscriber callbacks run after the lock is released and may call
//! back into the window.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use types::errors::WindowError;
use types::ids::WindowId;
use types::range::LatestTime;
use types::record::{TimeData, TIME_FIELD};

use crate::clock::{Clock, SystemClock};
use crate::config::WindowConfig;
use crate::list::{Direction, Link, NodeId, TimeList};
use crate::metrics::{MetricsSnapshot, WindowMetrics};
use crate::source::{HistorySource, LiveFeed, NoLiveFeed};
use crate::streaming::StreamSession;
use crate::subscribers::{KeyUpdateFn, Subscribers, SubscriptionId, UpdateFn};

/// A queued load. Resolves to whether anything was loaded; clones resolve
/// to the same outcome.
pub type PendingLoad = Shared<BoxFuture<'static, Result<bool, WindowError>>>;

pub(crate) struct WindowState {
    pub(crate) list: TimeList<TimeData>,
    pub(crate) field_min: BTreeMap<String, f64>,
    pub(crate) field_max: BTreeMap<String, f64>,
    pub(crate) keys: BTreeSet<String>,
    /// No source record exists at or before this time.
    pub(crate) oldest_time: Option<f64>,
    /// The window is gap-free up to this time.
    pub(crate) latest_time: Option<LatestTime>,
    pub(crate) stream: Option<StreamSession>,
}

impl WindowState {
    fn new() -> Self {
        let mut keys = BTreeSet::new();
        keys.insert(TIME_FIELD.to_string());
        Self {
            list: TimeList::new(),
            field_min: BTreeMap::new(),
            field_max: BTreeMap::new(),
            keys,
            oldest_time: None,
            latest_time: None,
            stream: None,
        }
    }

    pub(crate) fn first_time(&self) -> Result<Option<f64>, WindowError> {
        let first = self.list.first()?;
        Ok(self.list.value(first)?.map(|r| r.time))
    }

    pub(crate) fn last_time(&self) -> Result<Option<f64>, WindowError> {
        let last = self.list.last()?;
        Ok(self.list.value(last)?.map(|r| r.time))
    }

    /// Fold one record into the extrema and key set. Returns newly seen keys.
    fn absorb_record(&mut self, record: &TimeData) -> Vec<String> {
        let mut new_keys = Vec::new();
        for (key, value) in record.entries() {
            update_extremum(&mut self.field_max, key, value, f64::max);
            update_extremum(&mut self.field_min, key, value, f64::min);
            if self.keys.insert(key.to_string()) {
                new_keys.push(key.to_string());
            }
        }
        new_keys
    }

    /// Fold another window's bookkeeping into this one. Returns newly seen keys.
    fn absorb_window(&mut self, other: &WindowState) -> Vec<String> {
        for (key, value) in &other.field_max {
            update_extremum(&mut self.field_max, key, *value, f64::max);
        }
        for (key, value) in &other.field_min {
            update_extremum(&mut self.field_min, key, *value, f64::min);
        }
        let mut new_keys = Vec::new();
        for key in &other.keys {
            if self.keys.insert(key.clone()) {
                new_keys.push(key.clone());
            }
        }
        new_keys
    }
}

fn update_extremum(
    map: &mut BTreeMap<String, f64>,
    key: &str,
    value: f64,
    pick: fn(f64, f64) -> f64,
) {
    match map.get_mut(key) {
        Some(current) => *current = pick(*current, value),
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

pub(crate) struct Inner {
    pub(crate) id: WindowId,
    pub(crate) state: Mutex<WindowState>,
    pub(crate) history: Arc<dyn HistorySource>,
    pub(crate) feed: Arc<dyn LiveFeed>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: WindowConfig,
    pub(crate) metrics: Arc<WindowMetrics>,
    pub(crate) on_update: Subscribers<UpdateFn>,
    pub(crate) on_key_update: Subscribers<KeyUpdateFn>,
    pub(crate) load_queue: Mutex<PendingLoad>,
}

/// Lazy-loading, time-ordered window over a historical source and a live
/// feed.
#[derive(Clone)]
pub struct DataList {
    pub(crate) inner: Arc<Inner>,
}

/// Builder for `DataList`.
pub struct DataListBuilder {
    history: Arc<dyn HistorySource>,
    feed: Arc<dyn LiveFeed>,
    clock: Arc<dyn Clock>,
    config: WindowConfig,
    metrics: Option<Arc<WindowMetrics>>,
}

impl DataListBuilder {
    pub fn live_feed(mut self, feed: Arc<dyn LiveFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: WindowConfig) -> Self {
        self.config = config;
        self
    }

    /// Share counters with other windows.
    pub fn metrics(mut self, metrics: Arc<WindowMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> DataList {
        let id = WindowId::new();
        let idle: PendingLoad = futures::future::ready(Ok(false)).boxed().shared();
        debug!(
            window_id = %id,
            max_pages_per_load = self.config.max_pages_per_load,
            "DataList created"
        );
        DataList {
            inner: Arc::new(Inner {
                id,
                state: Mutex::new(WindowState::new()),
                history: self.history,
                feed: self.feed,
                clock: self.clock,
                config: self.config,
                metrics: self.metrics.unwrap_or_default(),
                on_update: Subscribers::new(),
                on_key_update: Subscribers::new(),
                load_queue: Mutex::new(idle),
            }),
        }
    }
}

impl DataList {
    /// Window over `history` with a live `feed`, the system clock and
    /// default configuration.
    pub fn new(history: Arc<dyn HistorySource>, feed: Arc<dyn LiveFeed>) -> Self {
        Self::builder(history).live_feed(feed).build()
    }

    pub fn builder(history: Arc<dyn HistorySource>) -> DataListBuilder {
        DataListBuilder {
            history,
            feed: Arc::new(NoLiveFeed),
            clock: Arc::new(SystemClock),
            config: WindowConfig::default(),
            metrics: None,
        }
    }

    /// A fresh, empty window sharing this one's collaborators and counters.
    pub(crate) fn sibling(&self) -> DataList {
        Self::builder(Arc::clone(&self.inner.history))
            .live_feed(Arc::clone(&self.inner.feed))
            .clock(Arc::clone(&self.inner.clock))
            .config(self.inner.config.clone())
            .metrics(Arc::clone(&self.inner.metrics))
            .build()
    }

    pub fn id(&self) -> WindowId {
        self.inner.id
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn now(&self) -> f64 {
        self.inner.clock.now_millis()
    }

    /// Run a synchronous mutation, then fire key and update notifications
    /// outside the lock.
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut WindowState) -> Result<(R, Vec<String>), WindowError>,
    ) -> Result<R, WindowError> {
        let (result, new_keys) = {
            let mut state = self.lock_state();
            f(&mut state)?
        };
        for key in &new_keys {
            self.inner.on_key_update.notify(key);
        }
        self.inner.on_update.notify();
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    /// Prepend a record. Fails with `OutOfOrder` if it is newer than the
    /// current first record.
    pub fn add_first(&self, value: TimeData) -> Result<NodeId, WindowError> {
        self.mutate(|state| {
            state.list.ensure_alive()?;
            if let Some(first) = state.first_time()? {
                if value.time > first {
                    return Err(WindowError::OutOfOrder {
                        time: value.time,
                        boundary: first,
                    });
                }
            }
            let new_keys = state.absorb_record(&value);
            let id = state.list.add_first(value)?;
            Ok((id, new_keys))
        })
    }

    /// Append a record. Fails with `OutOfOrder` if it is older than the
    /// current last record.
    pub fn add_last(&self, value: TimeData) -> Result<NodeId, WindowError> {
        self.mutate(|state| {
            state.list.ensure_alive()?;
            if let Some(last) = state.last_time()? {
                if value.time < last {
                    return Err(WindowError::OutOfOrder {
                        time: value.time,
                        boundary: last,
                    });
                }
            }
            let new_keys = state.absorb_record(&value);
            let id = state.list.add_last(value)?;
            Ok((id, new_keys))
        })
    }

    /// Splice `other` (older data) onto the front. `other` is destroyed.
    pub fn merge_first(&self, other: &DataList) -> Result<(), WindowError> {
        self.merge(other, Direction::Backward)
    }

    /// Splice `other` (newer data) onto the back and take the max of both
    /// `latest_time` watermarks. `other` is destroyed.
    pub fn merge_last(&self, other: &DataList) -> Result<(), WindowError> {
        self.merge(other, Direction::Forward)
    }

    fn merge(&self, other: &DataList, side: Direction) -> Result<(), WindowError> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Err(WindowError::invalid_request("cannot merge a window into itself"));
        }
        let new_keys = {
            // Lock in id order so two opposite merges cannot deadlock.
            let (mut mine, mut theirs) = if self.inner.id < other.inner.id {
                let mine = self.lock_state();
                (mine, other.lock_state())
            } else {
                let theirs = other.lock_state();
                (self.lock_state(), theirs)
            };
            mine.list.ensure_alive()?;
            theirs.list.ensure_alive()?;

            let boundary = match side {
                Direction::Forward => mine.last_time()?.zip(theirs.first_time()?),
                Direction::Backward => theirs.last_time()?.zip(mine.first_time()?),
            };
            if let Some((left, right)) = boundary {
                if right < left {
                    let (time, boundary) = match side {
                        Direction::Forward => (right, left),
                        Direction::Backward => (left, right),
                    };
                    return Err(WindowError::OutOfOrder { time, boundary });
                }
            }

            let new_keys = mine.absorb_window(&theirs);
            match side {
                Direction::Forward => {
                    mine.latest_time = LatestTime::merge(mine.latest_time, theirs.latest_time);
                    mine.list.merge_last(&mut theirs.list)?;
                }
                Direction::Backward => {
                    mine.list.merge_first(&mut theirs.list)?;
                }
            }
            // Closing the absorbed window's stream, if any
            theirs.stream = None;
            new_keys
        };
        self.inner.metrics.record_merge();
        debug!(
            window_id = %self.inner.id,
            absorbed = %other.inner.id,
            side = ?side,
            "Window merged"
        );
        for key in &new_keys {
            self.inner.on_key_update.notify(key);
        }
        self.inner.on_update.notify();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Read access
    // ---------------------------------------------------------------------

    pub fn is_destroyed(&self) -> bool {
        self.lock_state().list.is_destroyed()
    }

    pub fn len(&self) -> usize {
        self.lock_state().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().list.is_empty()
    }

    /// First element, or a sentinel when empty.
    pub fn first(&self) -> Result<Link, WindowError> {
        self.lock_state().list.first()
    }

    /// Last element, or a sentinel when empty.
    pub fn last(&self) -> Result<Link, WindowError> {
        self.lock_state().list.last()
    }

    pub fn first_time(&self) -> Result<Option<f64>, WindowError> {
        self.lock_state().first_time()
    }

    pub fn last_time(&self) -> Result<Option<f64>, WindowError> {
        self.lock_state().last_time()
    }

    /// Copy of the record at `link`.
    pub fn value(&self, link: Link) -> Result<Option<TimeData>, WindowError> {
        Ok(self.lock_state().list.value(link)?.cloned())
    }

    /// Run `f` against the underlying list, e.g. to traverse it from a
    /// stored handle. The window is locked for the duration of `f`.
    pub fn read<R>(&self, f: impl FnOnce(&TimeList<TimeData>) -> R) -> Result<R, WindowError> {
        let state = self.lock_state();
        state.list.ensure_alive()?;
        Ok(f(&state.list))
    }

    /// All records front to back.
    pub fn to_vec(&self) -> Result<Vec<TimeData>, WindowError> {
        self.read(|list| {
            list.iter_forward()
                .map(|iter| iter.map(|(_, record)| record.clone()).collect())
        })?
    }

    /// Field names seen so far, `time` included.
    pub fn keys(&self) -> Result<BTreeSet<String>, WindowError> {
        let state = self.lock_state();
        state.list.ensure_alive()?;
        Ok(state.keys.clone())
    }

    pub fn oldest_time(&self) -> Option<f64> {
        self.lock_state().oldest_time
    }

    pub fn latest_time(&self) -> Option<LatestTime> {
        self.lock_state().latest_time
    }

    /// Largest value held across `fields`; `None` if none of them has data.
    pub fn get_max_val(&self, fields: &[&str]) -> Option<f64> {
        let state = self.lock_state();
        fields
            .iter()
            .filter_map(|f| state.field_max.get(*f).copied())
            .reduce(f64::max)
    }

    /// Smallest value held across `fields`; `None` if none of them has data.
    pub fn get_min_val(&self, fields: &[&str]) -> Option<f64> {
        let state = self.lock_state();
        fields
            .iter()
            .filter_map(|f| state.field_min.get(*f).copied())
            .reduce(f64::min)
    }

    /// Element with the greatest time `<= time`, walking from `start` (or
    /// the first element). Pass the previous result as `start` for
    /// near-constant cost on sequential lookups. A time before the first
    /// element resolves to the first element; an empty window yields `None`.
    pub fn get_element_from_time(
        &self,
        time: f64,
        start: Option<NodeId>,
    ) -> Result<Option<NodeId>, WindowError> {
        let state = self.lock_state();
        let list = &state.list;
        let mut pointer = match start {
            Some(id) => id,
            None => match list.first()?.node() {
                Some(id) => id,
                None => return Ok(None),
            },
        };
        let time_at = |id: NodeId| -> Result<f64, WindowError> {
            Ok(list
                .value(Link::Node(id))?
                .map(|r| r.time)
                .unwrap_or(f64::NAN))
        };
        if time_at(pointer)? < time {
            while let Some(next) = list.next(Link::Node(pointer))?.node() {
                if time_at(next)? > time {
                    break;
                }
                pointer = next;
            }
        } else {
            while time < time_at(pointer)? {
                match list.prev(Link::Node(pointer))?.node() {
                    Some(prev) => pointer = prev,
                    None => break,
                }
            }
        }
        Ok(Some(pointer))
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Call `f` after every successful mutation until `signal` is cancelled.
    /// Registering with an already-cancelled signal does nothing.
    pub fn on_update(
        &self,
        f: impl Fn() + Send + Sync + 'static,
        signal: Option<CancellationToken>,
    ) -> Option<SubscriptionId> {
        self.inner.on_update.add(Arc::new(f), signal)
    }

    /// Call `f` with each newly discovered field name until `signal` is
    /// cancelled.
    pub fn on_key_update(
        &self,
        f: impl Fn(&str) + Send + Sync + 'static,
        signal: Option<CancellationToken>,
    ) -> Option<SubscriptionId> {
        self.inner.on_key_update.add(Arc::new(f), signal)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.on_update.remove(id) || self.inner.on_key_update.remove(id)
    }

    // ---------------------------------------------------------------------
    // Observability
    // ---------------------------------------------------------------------

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn metrics_handle(&self) -> Arc<WindowMetrics> {
        Arc::clone(&self.inner.metrics)
    }
}

impl std::fmt::Debug for DataList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("DataList")
            .field("id", &self.inner.id)
            .field("list", &state.list)
            .field("oldest_time", &state.oldest_time)
            .field("latest_time", &state.latest_time)
            .finish()
    }
}
