//! Trigger rate limiting and timekeeping.
//!
//! Confirmed motion events pass through a [`TriggerGate`] before they
//! reach capture and notification collaborators.

mod clock;
mod gate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{RateLimiter, TriggerEvent, TriggerGate, TriggerRecord};
