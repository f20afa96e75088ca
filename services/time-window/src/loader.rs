//! Lazy loading from the historical source
//!
//! `request_data` decides which parts of a requested range are missing and
//! queues the fetches. Loads on one window form a chain: each new load is
//! linked behind the current tail at call time and starts only after the
//! previous one has finished, successfully or not. Failures of the
//! historical source are logged and swallowed so the chain keeps going.
//!
//! Decision policy per load:
//!
//! | range | window    | action                                              |
//! |-------|-----------|-----------------------------------------------------|
//! | none  | empty     | one unbounded fetch                                 |
//! | none  | non-empty | `InvalidRequest`                                    |
//! | some  | empty     | one bounded fetch of the (expanded) range, unless live |
//! | some  | non-empty | backward fetch if older than first element, then a  |
//! |       |           | forward window merged on the tail if the watermark  |
//! |       |           | stops short of the range                            |

use std::sync::Arc;
use std::time::Instant;

use futures::future::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};
use types::errors::WindowError;
use types::range::{LatestTime, TimeRange};
use types::record::TimeData;

use crate::config::RequestOptions;
use crate::list::Direction;
use crate::window::{DataList, PendingLoad};

/// Parameters of one backward walk through the historical source.
#[derive(Debug, Clone, Default)]
pub(crate) struct BackwardFetch {
    /// Keep fetching older pages until the first element is at or before this.
    pub(crate) target_oldest: Option<f64>,
    /// Anchor for the first fetch when the window is empty.
    pub(crate) anchor: Option<f64>,
    /// Stop consuming a page at the first record older than `target_oldest`.
    pub(crate) stop_below_target: bool,
    /// Records another window already holds at the join point; equal
    /// records are not added again.
    pub(crate) seam: Vec<TimeData>,
    /// Records older than this cannot be joined onto the other window.
    pub(crate) floor: Option<f64>,
}

impl BackwardFetch {
    fn skips(&self, record: &TimeData) -> bool {
        self.floor.is_some_and(|floor| record.time < floor) || self.seam.contains(record)
    }
}

impl DataList {
    /// Queue a load covering `range` (or the most recent page when `range`
    /// is `None` and the window is empty).
    ///
    /// The returned future resolves to whether anything was loaded. Calls
    /// run strictly in call order. A failing historical fetch is logged and
    /// resolves to `Ok(false)`; caller errors (`InvalidRequest`,
    /// `UsedAfterDestroy`) are returned.
    ///
    /// Inside a tokio runtime the load is started right away and the
    /// returned handle need not be awaited; subscribers see the result.
    /// Outside a runtime it runs once the handle (or a later load, or
    /// `settled()`) is awaited.
    pub fn request_data(&self, range: Option<TimeRange>, options: RequestOptions) -> PendingLoad {
        let mut queue = self
            .inner
            .load_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = queue.clone();
        let window = Arc::downgrade(&self.inner);
        let load = async move {
            // Outcome of the previous link does not matter here
            let _ = previous.await;
            match window.upgrade() {
                Some(inner) => DataList { inner }.run_load(range, options).await,
                None => Ok(false),
            }
        }
        .boxed()
        .shared();
        *queue = load.clone();
        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(load.clone());
        }
        load
    }

    /// `request_data` for a range with the configured prefetch default.
    pub fn request_range(&self, range: TimeRange) -> PendingLoad {
        self.request_data(Some(range), RequestOptions::from(&self.inner.config))
    }

    /// Wait until every load queued so far has finished.
    pub async fn settled(&self) {
        let tail = self
            .inner
            .load_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let _ = tail.await;
    }

    async fn run_load(
        &self,
        range: Option<TimeRange>,
        options: RequestOptions,
    ) -> Result<bool, WindowError> {
        match self.plan_load(range, options).await {
            Ok(loaded) => {
                self.inner.metrics.record_load(false);
                Ok(loaded)
            }
            Err(err) if err.is_fetch_failure() => {
                self.inner.metrics.record_load(true);
                error!(
                    window_id = %self.inner.id,
                    range = ?range,
                    error = %err,
                    "Queued load failed"
                );
                Ok(false)
            }
            Err(err) => {
                self.inner.metrics.record_load(true);
                warn!(
                    window_id = %self.inner.id,
                    range = ?range,
                    error = %err,
                    "Load rejected"
                );
                Err(err)
            }
        }
    }

    async fn plan_load(
        &self,
        range: Option<TimeRange>,
        options: RequestOptions,
    ) -> Result<bool, WindowError> {
        let (first_time, latest_time) = {
            let state = self.lock_state();
            (state.first_time()?, state.latest_time)
        };

        let Some(range) = range else {
            if first_time.is_some() {
                return Err(WindowError::invalid_request(
                    "a range is required once the window holds data",
                ));
            }
            self.fetch_backward(BackwardFetch::default()).await?;
            return Ok(true);
        };

        let target = if options.allow_additional_range {
            range.expanded()
        } else {
            range
        };

        let Some(first_time) = first_time else {
            if latest_time.is_some_and(|l| l.is_live()) {
                return Ok(false);
            }
            self.fetch_backward(BackwardFetch {
                target_oldest: Some(target.oldest_time),
                anchor: Some(target.latest_time),
                ..Default::default()
            })
            .await?;
            return Ok(true);
        };

        let mut loaded = false;
        if range.oldest_time < first_time {
            self.fetch_backward(BackwardFetch {
                target_oldest: Some(target.oldest_time),
                ..Default::default()
            })
            .await?;
            loaded = true;
        }
        if let Some(watermark) = self.latest_time().and_then(|l| l.as_finite()) {
            if watermark < range.latest_time {
                loaded |= self.extend_forward(watermark, target.latest_time).await?;
            }
        }
        Ok(loaded)
    }

    /// Build a separate window covering `(watermark, until)` and merge it on
    /// the tail. The temporary window is never visible to callers. It is
    /// dropped unmerged if it could not be filled down to the watermark, so
    /// the window never claims a gap as covered. Returns whether it merged.
    async fn extend_forward(&self, watermark: f64, until: f64) -> Result<bool, WindowError> {
        let (seam, floor) = self.read(|list| -> Result<_, WindowError> {
            let mut seam = Vec::new();
            let mut floor = None;
            for (_, record) in list.iter(list.last()?, Direction::Backward)? {
                floor.get_or_insert(record.time);
                if record.time < watermark {
                    break;
                }
                seam.push(record.clone());
            }
            Ok((seam, floor))
        })??;

        let forward = self.sibling();
        debug!(
            window_id = %self.inner.id,
            forward_window = %forward.id(),
            watermark,
            until,
            "Extending window forward"
        );
        let complete = forward
            .fetch_backward(BackwardFetch {
                target_oldest: Some(watermark),
                anchor: Some(until),
                stop_below_target: true,
                seam,
                floor,
            })
            .await?;
        if !complete {
            warn!(
                window_id = %self.inner.id,
                forward_window = %forward.id(),
                watermark,
                until,
                "Forward window did not reach the watermark; discarding it"
            );
            return Ok(false);
        }
        self.merge_last(&forward)?;
        Ok(true)
    }

    /// Walk backward through the historical source, prepending each page,
    /// until the first element reaches `plan.target_oldest`, the source is
    /// exhausted, or the page was cut short by `stop_below_target`.
    ///
    /// Returns `false` only when the page limit ended the walk first.
    pub(crate) async fn fetch_backward(&self, plan: BackwardFetch) -> Result<bool, WindowError> {
        let max_pages = self.inner.config.max_pages_per_load;
        let mut anchor_hint = plan.anchor;

        for page in 0..max_pages {
            let (anchor, oldest_time, pending_latest) = {
                let state = self.lock_state();
                match state.first_time()? {
                    Some(first) => (Some(first), state.oldest_time, None),
                    None => {
                        // An empty window starts at the requested upper bound
                        // and will be complete up to it (capped at now).
                        let pending = anchor_hint.filter(|latest| {
                            state.latest_time.map_or(true, |w| w.is_before(*latest))
                        });
                        (anchor_hint, state.oldest_time, pending.map(|l| l.min(self.now())))
                    }
                }
            };

            if let (Some(anchor), Some(oldest)) = (anchor, oldest_time) {
                if anchor <= oldest {
                    debug!(
                        window_id = %self.inner.id,
                        anchor,
                        oldest_time = oldest,
                        "Nothing older exists; skipping fetch"
                    );
                    return Ok(true);
                }
            }

            let started = Instant::now();
            let records = self
                .inner
                .history
                .fetch_before(anchor)
                .await
                .map_err(|err| WindowError::FetchFailure {
                    anchor,
                    reason: format!("{err:#}"),
                })?;
            self.inner
                .metrics
                .record_fetch(started.elapsed().as_micros() as u64, records.is_empty());
            debug!(
                window_id = %self.inner.id,
                page,
                anchor = ?anchor,
                records = records.len(),
                "Fetched history page"
            );

            {
                let mut state = self.lock_state();
                state.list.ensure_alive()?;
                if let Some(latest) = pending_latest {
                    state.latest_time = Some(LatestTime::Until(latest));
                }
                if records.is_empty() {
                    state.oldest_time = match (state.oldest_time, anchor) {
                        (None, anchor) => anchor,
                        (Some(oldest), anchor) => {
                            Some(anchor.unwrap_or_else(|| self.now()).max(oldest))
                        }
                    };
                    return Ok(true);
                }
            }

            let mut stopped = false;
            let mut page_oldest = None;
            for record in records {
                page_oldest = Some(record.time);
                if plan.stop_below_target && plan.target_oldest.is_some_and(|t| record.time < t) {
                    stopped = true;
                    break;
                }
                if plan.skips(&record) {
                    self.inner.metrics.record_skipped();
                    continue;
                }
                match self.add_first(record) {
                    Ok(_) => self.inner.metrics.record_prepended(),
                    Err(WindowError::OutOfOrder { time, boundary }) => {
                        self.inner.metrics.record_skipped();
                        warn!(
                            window_id = %self.inner.id,
                            time,
                            boundary,
                            "Skipping history record that is not older than the window"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }

            let first_time = {
                let mut state = self.lock_state();
                if state.latest_time.is_none() {
                    state.latest_time = state.last_time()?.map(LatestTime::Until);
                }
                state.first_time()?
            };

            let progressed = match (first_time, anchor) {
                (Some(first), Some(anchor)) => first < anchor,
                (Some(_), None) => true,
                (None, _) => false,
            };
            // A page reaching the target covers it even if its oldest records
            // were skipped as already held
            let covered = match plan.target_oldest {
                Some(target) => {
                    page_oldest.is_some_and(|t| t <= target)
                        || first_time.is_some_and(|f| f <= target)
                }
                None => true,
            };
            let more = !stopped && progressed && !covered;
            if !more {
                return Ok(true);
            }
            anchor_hint = None;
        }

        warn!(
            window_id = %self.inner.id,
            max_pages,
            "Load reached the page limit before covering its range"
        );
        Ok(false)
    }
}
