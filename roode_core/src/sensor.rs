//! One side of the doorway: a `RangeFinder` plus its presence threshold and
//! acquisition health.

use std::time::Duration;

use eyre::WrapErr;
use roode_traits::{RangeFinder, Role};

use crate::calibration::CalibrationResult;
use crate::config::SensorCfg;
use crate::error::{Result, RoodeError};
use crate::hw_error::map_hw_error;

/// Acquisition duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    /// Single-shot reads on demand.
    Idle,
    /// Back-to-back ranging.
    Continuous,
}

pub struct RangeSensor<R: RangeFinder> {
    finder: R,
    role: Role,
    cfg: SensorCfg,
    threshold_mm: u16,
    mode: SensorMode,
    last_mm: Option<u16>,
    misses: u32,
    timed_out: bool,
}

impl<R: RangeFinder> core::fmt::Debug for RangeSensor<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RangeSensor")
            .field("role", &self.role)
            .field("threshold_mm", &self.threshold_mm)
            .field("mode", &self.mode)
            .field("last_mm", &self.last_mm)
            .field("misses", &self.misses)
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

impl<R: RangeFinder> RangeSensor<R> {
    pub fn new(finder: R, role: Role, cfg: SensorCfg) -> Self {
        Self {
            finder,
            role,
            threshold_mm: cfg.threshold_mm,
            cfg,
            mode: SensorMode::Idle,
            last_mm: None,
            misses: 0,
            timed_out: false,
        }
    }

    /// Configure the device at its bus address.
    pub fn initialize(&mut self) -> Result<()> {
        self.finder.initialize().map_err(|e| {
            let err = RoodeError::SensorInit {
                role: self.role,
                reason: e.to_string(),
            };
            tracing::error!(role = %self.role, error = %e, "range sensor initialization failed");
            eyre::Report::new(err)
        })?;
        tracing::debug!(role = %self.role, threshold_mm = self.threshold_mm, "range sensor ready");
        Ok(())
    }

    /// Take one reading. `None` means the acquisition was missed.
    pub fn read(&mut self) -> Option<u16> {
        let timeout = Duration::from_millis(self.cfg.acquisition_timeout_ms);
        match self.finder.read_range(timeout) {
            Ok(mm) => {
                tracing::trace!(role = %self.role, mm, "range read");
                self.last_mm = Some(mm);
                self.misses = 0;
                Some(mm)
            }
            Err(e) => {
                self.misses = self.misses.saturating_add(1);
                match map_hw_error(&*e) {
                    RoodeError::Timeout => {
                        tracing::debug!(role = %self.role, misses = self.misses, "acquisition missed");
                    }
                    other => {
                        tracing::warn!(role = %self.role, misses = self.misses, error = %other, "range read failed");
                    }
                }
                if !self.timed_out && self.misses >= self.cfg.miss_limit {
                    self.timed_out = true;
                    tracing::warn!(
                        role = %self.role,
                        error = %RoodeError::SensorTimeout(self.role),
                        "miss limit reached"
                    );
                }
                None
            }
        }
    }

    pub fn timeout_occurred(&self) -> bool {
        self.timed_out
    }

    /// Switch the acquisition duty cycle; no-op when already in `mode`.
    pub fn set_mode(&mut self, mode: SensorMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }
        let res = match mode {
            SensorMode::Continuous => self.finder.start_continuous(),
            SensorMode::Idle => self.finder.stop_continuous(),
        };
        res.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("{} sensor: switching to {mode:?}", self.role))?;
        tracing::debug!(role = %self.role, ?mode, "sensor mode");
        self.mode = mode;
        Ok(())
    }

    /// Latest valid reading is within the threshold and the sensor is healthy.
    pub fn is_present(&self) -> bool {
        !self.timed_out && self.last_mm.is_some_and(|mm| mm <= self.threshold_mm)
    }

    pub fn threshold(&self) -> u16 {
        self.threshold_mm
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> SensorMode {
        self.mode
    }

    pub fn last_reading(&self) -> Option<u16> {
        self.last_mm
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.misses
    }

    pub fn finder(&self) -> &R {
        &self.finder
    }

    /// Install a calibration result and clear the acquisition health state.
    pub(crate) fn apply_calibration(&mut self, result: &CalibrationResult) {
        self.threshold_mm = result.threshold_mm;
        self.misses = 0;
        self.timed_out = false;
        // Readings taken against the old threshold are not carried over.
        self.last_mm = None;
    }
}
