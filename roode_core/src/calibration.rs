//! Ambient calibration: derive a presence threshold from empty-doorway readings.

use std::sync::Arc;
use std::time::Duration;

use roode_traits::RangeFinder;
use roode_traits::clock::Clock;

use crate::config::CalibrationCfg;
use crate::error::{Result, RoodeError};
use crate::sensor::RangeSensor;

/// Outcome of one successful calibration. Replaces a sensor's threshold as a whole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub threshold_mm: u16,
    /// Mean of the valid ambient samples.
    pub mean_mm: f32,
    pub margin_mm: f32,
    pub taken: usize,
    pub valid: usize,
}

/// Minimum valid samples for `taken` readings, rounded up.
fn required_valid(min_valid_ratio: f32, taken: usize) -> usize {
    // Absorb f32 representation error so 0.3 * 10 needs 3, not 4.
    let exact = f64::from(min_valid_ratio) * taken as f64;
    (exact - 1e-6).ceil().max(0.0) as usize
}

/// Compute a threshold from raw ambient samples.
///
/// Missing samples and samples at or above `max_range_mm` are discarded. The
/// threshold is the mean of the rest minus `margin_ratio` of that mean.
pub fn compute_threshold(
    samples: &[Option<u16>],
    cfg: &CalibrationCfg,
) -> std::result::Result<CalibrationResult, RoodeError> {
    let taken = samples.len();
    let valid: Vec<u16> = samples
        .iter()
        .flatten()
        .copied()
        .filter(|&mm| mm < cfg.max_range_mm)
        .collect();
    let required = required_valid(cfg.min_valid_ratio, taken);
    if valid.is_empty() || valid.len() < required {
        return Err(RoodeError::InsufficientSamples {
            valid: valid.len(),
            taken,
            required,
        });
    }

    let sum: u64 = valid.iter().map(|&mm| u64::from(mm)).sum();
    let mean = sum as f64 / valid.len() as f64;
    let margin = f64::from(cfg.margin_ratio) * mean;
    let threshold = (mean - margin).round().clamp(0.0, f64::from(u16::MAX)) as u16;
    Ok(CalibrationResult {
        threshold_mm: threshold,
        mean_mm: mean as f32,
        margin_mm: margin as f32,
        taken,
        valid: valid.len(),
    })
}

/// Samples a sensor and installs the computed threshold.
pub struct Calibrator {
    cfg: CalibrationCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for Calibrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Calibrator").field("cfg", &self.cfg).finish()
    }
}

impl Calibrator {
    pub fn new(cfg: CalibrationCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { cfg, clock }
    }

    pub fn cfg(&self) -> &CalibrationCfg {
        &self.cfg
    }

    /// One calibration attempt. The sensor keeps its previous threshold on failure.
    pub fn calibrate<R: RangeFinder>(&self, sensor: &mut RangeSensor<R>) -> Result<CalibrationResult> {
        let interval = Duration::from_millis(self.cfg.sample_interval_ms);
        let mut samples = Vec::with_capacity(self.cfg.samples);
        for i in 0..self.cfg.samples {
            if i > 0 {
                self.clock.sleep(interval);
            }
            samples.push(sensor.read());
        }

        let role = sensor.role();
        let result = compute_threshold(&samples, &self.cfg).map_err(|e| match e {
            RoodeError::InsufficientSamples {
                valid,
                taken,
                required,
            } => RoodeError::CalibrationFailed {
                role,
                valid,
                taken,
                required,
            },
            other => other,
        });
        match result {
            Ok(r) => {
                sensor.apply_calibration(&r);
                tracing::info!(
                    %role,
                    threshold_mm = r.threshold_mm,
                    mean_mm = r.mean_mm,
                    valid = r.valid,
                    taken = r.taken,
                    "calibrated"
                );
                Ok(r)
            }
            Err(e) => {
                tracing::warn!(%role, error = %e, kept_threshold_mm = sensor.threshold(), "calibration failed");
                Err(e.into())
            }
        }
    }

    /// Calibrate with up to `retries` extra attempts and linear backoff between them.
    pub fn calibrate_with_retry<R: RangeFinder>(
        &self,
        sensor: &mut RangeSensor<R>,
    ) -> Result<CalibrationResult> {
        let mut attempt: u32 = 0;
        loop {
            match self.calibrate(sensor) {
                Ok(r) => return Ok(r),
                Err(e) if attempt >= self.cfg.retries => return Err(e),
                Err(_) => {
                    attempt += 1;
                    let backoff = self.cfg.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    tracing::debug!(role = %sensor.role(), attempt, backoff_ms = backoff, "retrying calibration");
                    self.clock.sleep(Duration::from_millis(backoff));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_valid_rounds_up() {
        assert_eq!(required_valid(0.5, 20), 10);
        assert_eq!(required_valid(0.5, 7), 4);
        assert_eq!(required_valid(0.3, 10), 3);
        assert_eq!(required_valid(1.0, 0), 0);
    }

    #[test]
    fn no_return_and_missing_samples_are_discarded() {
        let cfg = CalibrationCfg::default();
        let r = compute_threshold(&[Some(1000), None, Some(8190), Some(1200)], &cfg).unwrap();
        assert_eq!(r.valid, 2);
        assert_eq!(r.taken, 4);
        assert_eq!(r.threshold_mm, 990);
    }

    #[test]
    fn empty_input_fails() {
        let err = compute_threshold(&[], &CalibrationCfg::default()).unwrap_err();
        assert!(matches!(err, RoodeError::InsufficientSamples { valid: 0, .. }));
    }
}
