//! Error taxonomy for the tracking core.
//!
//! Only structural failures surface as errors: a bad configuration value or
//! desynchronized paired observation streams. Numerical edge cases (empty
//! point sets, zero-affinity columns, zero-length visibility rays) are
//! absorbed locally with documented default behavior, and end-of-stream is a
//! clean `Ok(None)` from the observation source, never an error.

use crate::types::FrameId;
use thiserror::Error;

/// Errors that abort a tracking run.
#[derive(Debug, Error)]
pub enum TrackError {
    /// A configuration value is outside its contract. Fatal at configuration
    /// time; never recoverable mid-run.
    #[error("invalid parameter `{name}` = {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// A required paired observation is missing while its partner arrived.
    /// Fatal for the run: tracking against misaligned streams produces
    /// confidently wrong results, so the loop aborts with no partial frame.
    #[error("observation streams desynchronized at frame {frame}")]
    StreamDesync { frame: FrameId },
}
