//! Clock and identifier helpers.

mod clock;
mod ids;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{new_id, new_trace_id};

/// Represents a UTC timestamp.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    chrono::Utc::now()
}
