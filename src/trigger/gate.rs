//! Rate limiting of fired motion events.
//!
//! A confirmed motion event only becomes a capture/trigger action when
//! the trigger limiter allows it. A second, independent limiter gates the
//! notification side effect of the same trigger.

use chrono::{DateTime, Local};

/// Minimum-interval limiter over wrapping millisecond stamps.
///
/// `last == None` is the "never fired" sentinel: the first request always
/// passes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval_ms: u32,
    last: Option<u32>,
}

impl RateLimiter {
    /// Creates a limiter that has never fired.
    pub fn new(interval_secs: u16) -> Self {
        Self {
            interval_ms: u32::from(interval_secs) * 1000,
            last: None,
        }
    }

    /// Creates a limiter whose interval starts counting at `now`.
    pub fn started_at(interval_secs: u16, now: u32) -> Self {
        Self {
            interval_ms: u32::from(interval_secs) * 1000,
            last: Some(now),
        }
    }

    pub fn set_interval_secs(&mut self, secs: u16) {
        self.interval_ms = u32::from(secs) * 1000;
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Returns true if enough time has passed since the last mark.
    pub fn is_ready(&self, now: u32) -> bool {
        match self.last {
            None => true,
            Some(last) => now.wrapping_sub(last) >= self.interval_ms,
        }
    }

    /// Records `now` as the start of the latest action.
    pub fn mark(&mut self, now: u32) {
        self.last = Some(now);
    }

    /// Marks and returns true if ready, otherwise leaves state untouched.
    pub fn try_acquire(&mut self, now: u32) -> bool {
        if self.is_ready(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }

    /// Restores the "never fired" sentinel.
    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

/// A confirmed, rate-limited motion event handed to collaborators.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// Wall-clock time of the trigger.
    pub timestamp: DateTime<Local>,
    /// Clock stamp of the trigger in milliseconds.
    pub at_ms: u32,
    /// Changed blocks in the firing frame.
    pub changed_blocks: u16,
    /// Maximum possible changed blocks under the current mask.
    pub capacity: u16,
    /// Human-readable description, e.g. `"2024-05-01 12:00:00 - 20 out of 192"`.
    pub description: String,
}

impl TriggerEvent {
    pub fn new(at_ms: u32, changed_blocks: u16, capacity: u16) -> Self {
        let timestamp = Local::now();
        let description = format!(
            "{} - {} out of {}",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            changed_blocks,
            capacity
        );
        Self {
            timestamp,
            at_ms,
            changed_blocks,
            capacity,
            description,
        }
    }
}

/// Last trigger as shown on the live status display.
#[derive(Debug, Clone)]
pub struct TriggerRecord {
    pub last_fired_ms: Option<u32>,
    pub description: String,
}

impl Default for TriggerRecord {
    fn default() -> Self {
        Self {
            last_fired_ms: None,
            description: "Not yet triggered".to_string(),
        }
    }
}

/// Trigger and notification limiters plus the last-trigger record.
#[derive(Debug, Clone)]
pub struct TriggerGate {
    trigger: RateLimiter,
    notify: RateLimiter,
    record: TriggerRecord,
}

impl TriggerGate {
    /// Creates a gate whose trigger timer starts at `now`, so the device
    /// cannot trigger the instant it boots. Notifications start in the
    /// "never sent" state.
    pub fn new(trigger_limit_secs: u16, notify_limit_secs: u16, now: u32) -> Self {
        Self {
            trigger: RateLimiter::started_at(trigger_limit_secs, now),
            notify: RateLimiter::new(notify_limit_secs),
            record: TriggerRecord::default(),
        }
    }

    /// Attempts to start a trigger action at `now`.
    pub fn try_trigger(&mut self, now: u32) -> bool {
        let allowed = self.trigger.try_acquire(now);
        if !allowed {
            tracing::debug!(
                since_last_ms = self.trigger.last().map(|l| now.wrapping_sub(l)),
                limit_ms = self.trigger.interval_ms(),
                "Too soon to re-trigger"
            );
        }
        allowed
    }

    /// Restarts the trigger interval without firing, e.g. after a camera
    /// mode switch disturbed the image.
    pub fn reset_timer(&mut self, now: u32) {
        self.trigger.mark(now);
    }

    /// Attempts to send a notification for a trigger at `now`.
    pub fn try_notify(&mut self, now: u32) -> bool {
        let allowed = self.notify.try_acquire(now);
        if !allowed {
            tracing::info!("Too soon to send another notification");
        }
        allowed
    }

    /// Lets the next notification through regardless of the limiter.
    pub fn rearm_notifications(&mut self) {
        self.notify.clear();
    }

    pub fn set_trigger_limit_secs(&mut self, secs: u16) {
        self.trigger.set_interval_secs(secs);
    }

    pub fn set_notify_limit_secs(&mut self, secs: u16) {
        self.notify.set_interval_secs(secs);
    }

    /// Stores `event` as the most recent trigger.
    pub fn record(&mut self, event: &TriggerEvent) {
        self.record = TriggerRecord {
            last_fired_ms: Some(event.at_ms),
            description: event.description.clone(),
        };
    }

    /// Replaces the displayed description without changing the timestamp.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.record.description = description.into();
    }

    pub fn last_record(&self) -> &TriggerRecord {
        &self.record
    }
}
