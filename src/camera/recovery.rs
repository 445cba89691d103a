//! Mode switching and the camera failure escalation ladder.
//!
//! ```text
//! capture retry → deinit/init (with backoff) → power cycle + trial capture → device restart
//! ```
//!
//! A mode switch starts at the reinitialisation rung; a failed capture
//! starts at the bottom.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::{CameraDriver, CameraError, PixelFormat, SensorFrame};
use crate::trigger::Clock;

use super::CameraFault;

/// Attempt counts and delays for each rung of the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Captures tried before escalating.
    pub capture_attempts: u32,
    /// Delay between failed captures.
    pub capture_retry_ms: u32,
    /// Deinit/init cycles tried before power cycling.
    pub reinit_attempts: u32,
    /// Delay between deinit/init cycles.
    pub reinit_backoff_ms: u32,
    /// Time the sensor is held unpowered.
    pub power_off_ms: u32,
    /// Settle time after power returns.
    pub power_on_settle_ms: u32,
    /// Settle time before the trial capture.
    pub trial_settle_ms: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            capture_attempts: 3,
            capture_retry_ms: 0,
            reinit_attempts: 2,
            reinit_backoff_ms: 50,
            power_off_ms: 200,
            power_on_settle_ms: 400,
            trial_settle_ms: 50,
        }
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

/// Running totals of recovery activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub mode_switches: u64,
    pub capture_failures: u64,
    pub mode_switch_failures: u64,
    pub power_cycles: u64,
    pub restarts: u64,
}

/// Drives the escalation ladder against a [`CameraDriver`].
#[derive(Debug, Clone, Default)]
pub struct CameraRecovery {
    policy: RecoveryPolicy,
    stats: RecoveryStats,
}

impl CameraRecovery {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            stats: RecoveryStats::default(),
        }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> RecoveryStats {
        self.stats
    }

    /// Reinitialises the sensor in `target` format.
    ///
    /// Escalates to a power cycle if every reinitialisation fails.
    pub fn switch_mode<D, C>(&mut self, driver: &mut D, target: PixelFormat, clock: &C) -> Result<(), CameraFault>
    where
        D: CameraDriver + ?Sized,
        C: Clock + ?Sized,
    {
        self.stats.mode_switches += 1;
        match self.reinit(driver, target, clock) {
            Ok(()) => Ok(()),
            Err(fault) => {
                tracing::warn!(error = %fault, "Mode switch failed, power cycling camera");
                self.recover_hardware(driver, target, clock)
            }
        }
    }

    fn reinit<D, C>(&mut self, driver: &mut D, target: PixelFormat, clock: &C) -> Result<(), CameraFault>
    where
        D: CameraDriver + ?Sized,
        C: Clock + ?Sized,
    {
        let attempts = self.policy.reinit_attempts.max(1);
        for attempt in 1..=attempts {
            driver.deinit();
            if attempt > 1 {
                clock.sleep(millis(self.policy.reinit_backoff_ms));
            }
            match driver.init(target) {
                Ok(()) => {
                    tracing::debug!(format = %target, attempt, "Camera initialised");
                    return Ok(());
                }
                Err(e) => {
                    self.stats.mode_switch_failures += 1;
                    tracing::warn!(format = %target, attempt, error = %e, "Camera init failed");
                }
            }
        }
        Err(CameraFault::ModeSwitchFailure {
            format: target,
            attempts,
        })
    }

    /// Power cycles the sensor, reinitialises it in grayscale and proves it
    /// with a trial capture, then switches to `target`.
    ///
    /// If the sensor still does not respond a device restart is requested
    /// and [`CameraFault::HardwareRecoveryFailure`] is returned.
    pub fn recover_hardware<D, C>(&mut self, driver: &mut D, target: PixelFormat, clock: &C) -> Result<(), CameraFault>
    where
        D: CameraDriver + ?Sized,
        C: Clock + ?Sized,
    {
        tracing::error!("Problem with camera detected so resetting it");
        self.stats.power_cycles += 1;
        driver.set_powered(false);
        clock.sleep(millis(self.policy.power_off_ms));
        driver.set_powered(true);
        clock.sleep(millis(self.policy.power_on_settle_ms));

        let trial = self.reinit(driver, PixelFormat::Grayscale, clock).and_then(|()| {
            clock.sleep(millis(self.policy.trial_settle_ms));
            driver
                .capture()
                .map(drop)
                .map_err(|source| CameraFault::CaptureFailure { attempts: 1, source })
        });
        let restored = trial.and_then(|()| match target {
            PixelFormat::Grayscale => Ok(()),
            PixelFormat::Jpeg => self.reinit(driver, PixelFormat::Jpeg, clock),
        });

        match restored {
            Ok(()) => {
                tracing::info!(format = %target, "Camera recovered after power cycle");
                Ok(())
            }
            Err(fault) => {
                self.stats.restarts += 1;
                tracing::error!(error = %fault, "Camera failed to recover, restarting device");
                driver.restart_device();
                Err(CameraFault::HardwareRecoveryFailure)
            }
        }
    }

    /// Runs `op` until it succeeds, escalating after the retry budget.
    ///
    /// After a successful hardware recovery `op` gets one more attempt.
    pub fn capture_with_retry<D, C, T, F>(
        &mut self,
        driver: &mut D,
        format: PixelFormat,
        clock: &C,
        mut op: F,
    ) -> Result<T, CameraFault>
    where
        D: CameraDriver + ?Sized,
        C: Clock + ?Sized,
        F: FnMut(&mut D) -> Result<T, CameraError>,
    {
        let attempts = self.policy.capture_attempts.max(1);
        let mut last = CameraError::CaptureFailed;
        for attempt in 1..=attempts {
            match op(driver) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.stats.capture_failures += 1;
                    tracing::warn!(attempt, error = %e, "Camera capture failed");
                    last = e;
                    if attempt < attempts {
                        clock.sleep(millis(self.policy.capture_retry_ms));
                    }
                }
            }
        }

        let fault = CameraFault::CaptureFailure { attempts, source: last };
        tracing::error!(error = %fault, "Capture retries exhausted");
        self.recover_hardware(driver, format, clock)?;
        op(driver).map_err(|source| {
            self.stats.capture_failures += 1;
            CameraFault::CaptureFailure {
                attempts: attempts + 1,
                source,
            }
        })
    }

    /// Captures one frame, recovering the hardware and trying once more
    /// if the sensor returns nothing.
    pub fn capture_once<D, C>(&mut self, driver: &mut D, format: PixelFormat, clock: &C) -> Result<SensorFrame, CameraFault>
    where
        D: CameraDriver + ?Sized,
        C: Clock + ?Sized,
    {
        match driver.capture() {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.stats.capture_failures += 1;
                tracing::warn!(%format, error = %e, "Camera capture failed, rebooting camera");
                self.recover_hardware(driver, format, clock)?;
                driver.capture().map_err(|source| {
                    self.stats.capture_failures += 1;
                    CameraFault::CaptureFailure { attempts: 2, source }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureConfig, MockSensor};
    use crate::trigger::ManualClock;

    fn sensor() -> MockSensor {
        let mut sensor = MockSensor::new(CaptureConfig::default(), 100);
        sensor.init(PixelFormat::Grayscale).unwrap();
        sensor
    }

    #[test]
    fn test_switch_mode_clean() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        let mut recovery = CameraRecovery::default();

        recovery.switch_mode(&mut sensor, PixelFormat::Jpeg, &clock).unwrap();
        assert_eq!(sensor.current_format(), Some(PixelFormat::Jpeg));
        assert_eq!(sensor.stats().power_cycles, 0);
        assert_eq!(clock.total_slept_ms(), 0);
    }

    #[test]
    fn test_switch_mode_retries_with_backoff() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.script_inits([true, false]);
        let mut recovery = CameraRecovery::default();

        recovery.switch_mode(&mut sensor, PixelFormat::Jpeg, &clock).unwrap();
        assert_eq!(sensor.current_format(), Some(PixelFormat::Jpeg));
        assert_eq!(clock.total_slept_ms(), 50);
        assert_eq!(recovery.stats().mode_switch_failures, 1);
        assert_eq!(sensor.stats().power_cycles, 0);
    }

    #[test]
    fn test_switch_mode_escalates_to_power_cycle() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.script_inits([true, true]);
        let mut recovery = CameraRecovery::default();

        recovery.switch_mode(&mut sensor, PixelFormat::Jpeg, &clock).unwrap();
        assert_eq!(sensor.stats().power_cycles, 1);
        assert_eq!(sensor.current_format(), Some(PixelFormat::Jpeg));
        assert!(!sensor.restart_requested());
        // backoff + power off + settle + trial settle
        assert_eq!(clock.total_slept_ms(), 50 + 200 + 400 + 50);
    }

    #[test]
    fn test_dead_sensor_requests_restart() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.kill();
        let mut recovery = CameraRecovery::default();

        let result = recovery.capture_with_retry(&mut sensor, PixelFormat::Grayscale, &clock, |d| d.capture());
        assert!(matches!(result, Err(CameraFault::HardwareRecoveryFailure)));
        assert!(sensor.restart_requested());
        assert_eq!(recovery.stats().capture_failures, 3);
        assert_eq!(recovery.stats().restarts, 1);
    }

    #[test]
    fn test_capture_retry_recovers_without_escalation() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.script_captures([true, true, false]);
        let mut recovery = CameraRecovery::default();

        let frame = recovery
            .capture_with_retry(&mut sensor, PixelFormat::Grayscale, &clock, |d| d.capture())
            .unwrap();
        assert!(frame.is_valid());
        assert_eq!(sensor.stats().power_cycles, 0);
        assert_eq!(recovery.stats().capture_failures, 2);
    }

    #[test]
    fn test_capture_once_recovers_jpeg_mode() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.init(PixelFormat::Jpeg).unwrap();
        sensor.script_captures([true]);
        let mut recovery = CameraRecovery::default();

        let frame = recovery.capture_once(&mut sensor, PixelFormat::Jpeg, &clock).unwrap();
        assert_eq!(frame.format(), PixelFormat::Jpeg);
        assert_eq!(sensor.stats().power_cycles, 1);
        assert_eq!(recovery.stats().capture_failures, 1);
    }

    #[test]
    fn test_exhausted_retries_power_cycle_then_succeed() {
        let clock = ManualClock::new();
        let mut sensor = sensor();
        sensor.script_captures([true, true, true]);
        let mut recovery = CameraRecovery::default();

        let frame = recovery
            .capture_with_retry(&mut sensor, PixelFormat::Grayscale, &clock, |d| d.capture())
            .unwrap();
        assert!(frame.is_valid());
        assert_eq!(sensor.stats().power_cycles, 1);
        assert!(!sensor.restart_requested());
    }
}
