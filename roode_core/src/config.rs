//! Runtime configuration for the gate engine and scheduler.
//!
//! These are the structs the core works with. They are separate from the
//! TOML-deserialized config in `roode_config`; see `conversions` for the mapping.

/// Threshold installed when no calibration succeeded and none is configured.
pub const DEFAULT_THRESHOLD_MM: u16 = 800;

/// Per-sensor acquisition settings.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    /// Presence threshold used until a calibration replaces it.
    pub threshold_mm: u16,
    /// Readings at or above this are "no return".
    pub max_range_mm: u16,
    /// Upper bound on a single acquisition wait.
    pub acquisition_timeout_ms: u64,
    /// Consecutive misses before the sensor reports a timeout.
    pub miss_limit: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            threshold_mm: DEFAULT_THRESHOLD_MM,
            max_range_mm: 8190,
            acquisition_timeout_ms: 50,
            miss_limit: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Calibrate both sensors during startup.
    pub enabled: bool,
    pub samples: usize,
    /// Fraction of the ambient mean subtracted to get the threshold.
    pub margin_ratio: f32,
    /// Minimum fraction of valid samples, rounded up.
    pub min_valid_ratio: f32,
    /// Ambient samples at or above this are discarded.
    pub max_range_mm: u16,
    /// Extra attempts after a failed calibration.
    pub retries: u32,
    /// Linear backoff unit between attempts.
    pub retry_backoff_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 20,
            margin_ratio: 0.10,
            min_valid_ratio: 0.5,
            max_range_mm: 8190,
            retries: 2,
            retry_backoff_ms: 100,
            sample_interval_ms: 0,
        }
    }
}

/// How the scheduler trades latency for energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPolicy {
    /// Sensors stay continuous; the gate is stepped every tick.
    AlwaysOn,
    /// Continuous only while motion is seen, idle polling otherwise.
    #[default]
    MotionGated,
    /// Like `MotionGated`, but blocks on the motion interrupt while idle.
    MotionSleep,
}

#[derive(Debug, Clone)]
pub struct PowerCfg {
    pub policy: PowerPolicy,
    /// Motion must stay low this long before the sensors go idle.
    pub settle_ms: u64,
    pub idle_poll_ms: u64,
    pub sleep_timeout_ms: u64,
    /// Awake tick rate; drives the loop period.
    pub sample_rate_hz: u32,
    /// Delay after sensor bring-up before the PIR output is trusted.
    pub warmup_ms: u64,
}

impl Default for PowerCfg {
    fn default() -> Self {
        Self {
            policy: PowerPolicy::MotionGated,
            settle_ms: 2_000,
            idle_poll_ms: 100,
            sleep_timeout_ms: 60_000,
            sample_rate_hz: 50,
            warmup_ms: 0,
        }
    }
}
