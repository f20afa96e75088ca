//! Live streaming
//!
//! `start_streaming` subscribes to the live feed and spawns one task per
//! session. On `Connected` the task queues a catch-up load from the last
//! held record to now; once it finishes the window is marked live and
//! records are appended as they arrive. Records that arrive before the
//! catch-up completes are held back in arrival order and appended right
//! after it.
//!
//! ```text
//!  feed ──► Connected ──► catch-up load ──► latest_time = Live
//!       └─► Record ─┬─ (before live) ─► backlog ─┐
//!                   └─ (live) ──────────────────┴─► add_last
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::errors::WindowError;
use types::range::{LatestTime, TimeRange};
use types::record::TimeData;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::events::StreamEvent;
use crate::window::{DataList, Inner};

/// Handle to a running stream task. Dropping it stops the task.
pub(crate) struct StreamSession {
    id: Uuid,
    stop: CancellationToken,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            stop: CancellationToken::new(),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl DataList {
    /// Open the live feed. A second call while streaming is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_streaming(&self) -> Result<(), WindowError> {
        let (session_id, stop) = {
            let mut state = self.lock_state();
            state.list.ensure_alive()?;
            if state.stream.is_some() {
                debug!(window_id = %self.inner.id, "Already streaming");
                return Ok(());
            }
            let session = StreamSession::new();
            let handle = (session.id, session.stop.clone());
            state.stream = Some(session);
            handle
        };

        let events = self.inner.feed.subscribe();
        info!(
            window_id = %self.inner.id,
            session_id = %session_id,
            "Streaming started"
        );
        tokio::spawn(run_session(Arc::downgrade(&self.inner), session_id, stop, events));
        Ok(())
    }

    /// Close the live feed, if any, and pin `latest_time` to now. Does not
    /// cancel a catch-up load already in flight; one that finishes later
    /// does not mark the window live again.
    pub fn stop_streaming(&self) {
        let session = {
            let mut state = self.lock_state();
            state.latest_time = Some(LatestTime::Until(self.now()));
            state.stream.take()
        };
        if let Some(session) = session {
            info!(
                window_id = %self.inner.id,
                session_id = %session.id,
                "Streaming stopped"
            );
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_state().stream.is_some()
    }

    fn is_session(&self, session_id: Uuid) -> bool {
        self.lock_state()
            .stream
            .as_ref()
            .is_some_and(|s| s.id == session_id)
    }

    /// Load everything between the last held record and now.
    async fn catch_up(&self) {
        let load = match self.last_time() {
            Ok(Some(last)) => self.request_data(
                Some(TimeRange::new(last, self.now())),
                RequestOptions::exact(),
            ),
            Ok(None) => self.request_data(None, RequestOptions::exact()),
            Err(err) => {
                warn!(window_id = %self.inner.id, error = %err, "Catch-up skipped");
                return;
            }
        };
        if let Err(err) = load.await {
            warn!(window_id = %self.inner.id, error = %err, "Catch-up load rejected");
        }
    }

    /// Mark the window live if `session_id` is still the active session.
    fn go_live(&self, session_id: Uuid) -> bool {
        let mut state = self.lock_state();
        let current = state.stream.as_ref().is_some_and(|s| s.id == session_id);
        if current {
            state.latest_time = Some(LatestTime::Live);
        }
        current
    }

    /// Append a streamed record unless the session has ended meanwhile.
    fn append_live(&self, session_id: Uuid, record: TimeData) {
        if !self.is_session(session_id) {
            return;
        }
        match self.add_last(record) {
            Ok(_) => self.inner.metrics.record_appended(),
            Err(err) => {
                self.inner.metrics.record_skipped();
                warn!(
                    window_id = %self.inner.id,
                    error = %err,
                    "Dropping live record"
                );
            }
        }
    }
}

async fn run_session(
    window: Weak<Inner>,
    session_id: Uuid,
    stop: CancellationToken,
    mut events: BoxStream<'static, StreamEvent>,
) {
    let mut live = false;
    let mut backlog: VecDeque<TimeData> = VecDeque::new();

    loop {
        let event = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            debug!(session_id = %session_id, "Live feed closed");
            break;
        };
        let Some(inner) = window.upgrade() else {
            break;
        };
        let list = DataList { inner };
        debug!(
            window_id = %list.id(),
            session_id = %session_id,
            event = event.event_type_label(),
            "Live event"
        );

        match event.decode() {
            None => {
                list.catch_up().await;
                if !list.go_live(session_id) {
                    break;
                }
                live = true;
                debug!(
                    window_id = %list.id(),
                    backlog = backlog.len(),
                    "Window is live"
                );
                while let Some(record) = backlog.pop_front() {
                    list.append_live(session_id, record);
                }
            }
            Some(Ok(record)) if live => list.append_live(session_id, record),
            Some(Ok(record)) => backlog.push_back(record),
            Some(Err(err)) => {
                list.inner.metrics.record_skipped();
                warn!(window_id = %list.id(), error = %err, "Undecodable live payload");
            }
        }
    }
    // Dropping `events` closes the channel
}
