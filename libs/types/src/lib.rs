//! Types library for the time-window cache
//!
//! Shared type definitions used by the window engine and by anything that
//! produces or consumes its records (historical sources, live feeds,
//! rendering layers).
//!
//! # Modules
//! - `ids`: Window identifiers (WindowId)
//! - `record`: The time-stamped record (TimeData)
//! - `range`: Requested time ranges and the upper watermark (TimeRange, LatestTime)
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod record;
pub mod range;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::record::*;
    pub use crate::range::*;
    pub use crate::errors::*;
}
