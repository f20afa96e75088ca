//! Window configuration

/// Configuration for a window and its loads.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Default for `RequestOptions::allow_additional_range`: prefetch one
    /// extra range width on each side of a requested range.
    pub allow_additional_range: bool,
    /// Maximum historical pages a single load may fetch before giving up.
    pub max_pages_per_load: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            allow_additional_range: true,
            max_pages_per_load: 10_000,
        }
    }
}

/// Per-call options for `DataList::request_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub allow_additional_range: bool,
}

impl RequestOptions {
    /// Load exactly the requested range.
    pub fn exact() -> Self {
        Self {
            allow_additional_range: false,
        }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            allow_additional_range: true,
        }
    }
}

impl From<&WindowConfig> for RequestOptions {
    fn from(config: &WindowConfig) -> Self {
        Self {
            allow_additional_range: config.allow_additional_range,
        }
    }
}
