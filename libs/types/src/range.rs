//! Requested time ranges and the upper completeness watermark

use serde::{Deserialize, Serialize};

/// A closed time span a consumer wants covered by the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub oldest_time: f64,
    pub latest_time: f64,
}

impl TimeRange {
    pub fn new(oldest_time: f64, latest_time: f64) -> Self {
        Self {
            oldest_time,
            latest_time,
        }
    }

    /// Width of the range.
    pub fn width(&self) -> f64 {
        self.latest_time - self.oldest_time
    }

    /// The range grown by its own width on both ends.
    ///
    /// Used for prefetching: a request for `[10, 20]` loads `[0, 30]`.
    pub fn expanded(&self) -> Self {
        Self {
            oldest_time: self.oldest_time - self.width(),
            latest_time: self.latest_time + self.width(),
        }
    }
}

/// Upper watermark of a window.
///
/// `Until(t)` asserts the window is gap-free up to `t`. `Live` means the
/// window is kept current by a live stream and orders after every finite
/// time.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum LatestTime {
    Until(f64),
    Live,
}

impl LatestTime {
    pub fn is_live(&self) -> bool {
        matches!(self, LatestTime::Live)
    }

    /// The finite watermark, if any.
    pub fn as_finite(&self) -> Option<f64> {
        match self {
            LatestTime::Until(t) => Some(*t),
            LatestTime::Live => None,
        }
    }

    /// Whether the watermark stops short of `time`.
    pub fn is_before(&self, time: f64) -> bool {
        match self {
            LatestTime::Until(t) => *t < time,
            LatestTime::Live => false,
        }
    }

    /// Max of two optional watermarks; an absent one carries no information.
    pub fn merge(a: Option<LatestTime>, b: Option<LatestTime>) -> Option<LatestTime> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b > a { b } else { a }),
            (a, None) => a,
            (None, b) => b,
        }
    }
}
