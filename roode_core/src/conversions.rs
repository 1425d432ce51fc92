//! `From` implementations bridging `roode_config` types to `roode_core` types.

use crate::config::{CalibrationCfg, DEFAULT_THRESHOLD_MM, PowerCfg, PowerPolicy, SensorCfg};

// ── Sensors ──────────────────────────────────────────────────────────────────

impl SensorCfg {
    /// Runtime settings for one sensor, taking shared limits from `[sensors]`.
    pub fn from_config(sensors: &roode_config::Sensors, pins: &roode_config::SensorPins) -> Self {
        Self {
            threshold_mm: pins.threshold_mm.unwrap_or(DEFAULT_THRESHOLD_MM),
            max_range_mm: sensors.max_range_mm,
            acquisition_timeout_ms: sensors.acquisition_timeout_ms,
            miss_limit: u32::from(sensors.miss_limit),
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&roode_config::Config> for CalibrationCfg {
    fn from(c: &roode_config::Config) -> Self {
        let cal = &c.calibration;
        Self {
            enabled: cal.enabled,
            samples: cal.samples,
            margin_ratio: cal.margin_ratio,
            min_valid_ratio: cal.min_valid_ratio,
            max_range_mm: c.sensors.max_range_mm,
            retries: u32::from(cal.retries),
            retry_backoff_ms: cal.retry_backoff_ms,
            sample_interval_ms: cal.sample_interval_ms,
        }
    }
}

// ── PowerCfg ─────────────────────────────────────────────────────────────────

impl From<roode_config::PowerPolicy> for PowerPolicy {
    fn from(p: roode_config::PowerPolicy) -> Self {
        match p {
            roode_config::PowerPolicy::AlwaysOn => Self::AlwaysOn,
            roode_config::PowerPolicy::MotionGated => Self::MotionGated,
            roode_config::PowerPolicy::MotionSleep => Self::MotionSleep,
        }
    }
}

impl From<&roode_config::Config> for PowerCfg {
    fn from(c: &roode_config::Config) -> Self {
        Self {
            policy: c.power.policy.into(),
            settle_ms: c.power.settle_ms,
            idle_poll_ms: c.power.idle_poll_ms,
            sleep_timeout_ms: c.power.sleep_timeout_ms,
            sample_rate_hz: c.power.sample_rate_hz,
            warmup_ms: c.motion.warmup_ms,
        }
    }
}
