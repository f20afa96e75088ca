//! Collaborator contracts consumed by the window
//!
//! - `HistorySource`: pages of historical records, newest first.
//! - `LiveFeed`: a push channel of `StreamEvent`s.

use async_trait::async_trait;
use futures::stream::BoxStream;
use types::record::TimeData;

use crate::events::StreamEvent;

/// Backward-paging access to historical records.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    /// Records with `time < anchor` (the most recent page when `anchor` is
    /// `None`), strictly descending by time. An empty page means nothing
    /// older exists. Must be safe to call repeatedly with decreasing anchors.
    async fn fetch_before(&self, anchor: Option<f64>) -> anyhow::Result<Vec<TimeData>>;
}

/// A source of live record events.
pub trait LiveFeed: Send + Sync + 'static {
    /// Open a new channel. Dropping the returned stream closes it.
    fn subscribe(&self) -> BoxStream<'static, StreamEvent>;
}

/// A feed that never connects, for windows that are only ever loaded from
/// history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveFeed;

impl LiveFeed for NoLiveFeed {
    fn subscribe(&self) -> BoxStream<'static, StreamEvent> {
        Box::pin(futures::stream::pending())
    }
}
