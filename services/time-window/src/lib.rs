//! Time Window Service
//!
//! A lazy-loading, time-ordered cache over an append-only time series:
//! - `TimeList`: doubly linked list with sentinels, O(1) merges and a
//!   destroyed state for absorbed lists
//! - `DataList`: the window itself, tracking per-field extrema, field
//!   names and the `oldest_time` / `latest_time` watermarks
//! - Serialized loads from a backward-paging `HistorySource`
//! - Live appends from a `LiveFeed` after a catch-up load
//!
//! # Architecture
//!
//! ```text
//!  HistorySource            LiveFeed
//!       │                      │
//!  ┌────▼─────┐          ┌─────▼─────┐
//!  │  Loader  │          │ Streaming │  ← backlog until caught up
//!  │ (queue)  │          └─────┬─────┘
//!  └────┬─────┘                │
//!       │ add_first /          │ add_last
//!       │ merge_last           │
//!  ┌────▼──────────────────────▼───┐
//!  │ DataList (TimeList<TimeData>) │
//!  └──────────────┬────────────────┘
//!                 │
//!        on_update / on_key_update
//! ```

pub mod clock;
pub mod config;
pub mod events;
pub mod list;
pub mod loader;
pub mod metrics;
pub mod source;
pub mod streaming;
pub mod subscribers;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RequestOptions, WindowConfig};
pub use events::StreamEvent;
pub use list::{Direction, Link, NodeId, TimeList};
pub use metrics::{MetricsSnapshot, WindowMetrics};
pub use source::{HistorySource, LiveFeed, NoLiveFeed};
pub use subscribers::SubscriptionId;
pub use window::{DataList, DataListBuilder, PendingLoad};

pub use types::errors::WindowError;
pub use types::range::{LatestTime, TimeRange};
pub use types::record::TimeData;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
