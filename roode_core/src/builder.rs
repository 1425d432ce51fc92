//! Type-state builder for the boxed `PowerScheduler` and the generic
//! `build_scheduler` constructor.
//!
//! The builder enforces at compile time that both sensors, the motion input and
//! the transmitter are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use roode_traits::clock::{Clock, MonotonicClock};
use roode_traits::{MotionInput, RangeFinder, Role, Transmitter};

use crate::calibration::Calibrator;
use crate::config::{CalibrationCfg, PowerCfg, SensorCfg};
use crate::error::{BuildError, Result};
use crate::scheduler::PowerScheduler;
use crate::sensor::RangeSensor;

/// Scheduler over boxed devices, as assembled by the CLI.
pub type DynScheduler =
    PowerScheduler<Box<dyn RangeFinder>, Box<dyn MotionInput>, Box<dyn Transmitter>>;

impl DynScheduler {
    pub fn builder() -> SchedulerBuilder<Missing, Missing, Missing> {
        SchedulerBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `DynScheduler`. All settings are validated on `build()`.
pub struct SchedulerBuilder<S, M, T> {
    room: Option<Box<dyn RangeFinder>>,
    corridor: Option<Box<dyn RangeFinder>>,
    motion: Option<Box<dyn MotionInput>>,
    tx: Option<Box<dyn Transmitter>>,
    room_cfg: SensorCfg,
    corridor_cfg: SensorCfg,
    calibration: CalibrationCfg,
    power: PowerCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _m: PhantomData<M>,
    _t: PhantomData<T>,
}

impl Default for SchedulerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            room: None,
            corridor: None,
            motion: None,
            tx: None,
            room_cfg: SensorCfg::default(),
            corridor_cfg: SensorCfg::default(),
            calibration: CalibrationCfg::default(),
            power: PowerCfg::default(),
            clock: None,
            _s: PhantomData,
            _m: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<S, M, T> SchedulerBuilder<S, M, T> {
    fn retype<S2, M2, T2>(self) -> SchedulerBuilder<S2, M2, T2> {
        SchedulerBuilder {
            room: self.room,
            corridor: self.corridor,
            motion: self.motion,
            tx: self.tx,
            room_cfg: self.room_cfg,
            corridor_cfg: self.corridor_cfg,
            calibration: self.calibration,
            power: self.power,
            clock: self.clock,
            _s: PhantomData,
            _m: PhantomData,
            _t: PhantomData,
        }
    }

    /// Provide both range finders.
    pub fn with_sensors(
        mut self,
        room: impl RangeFinder + 'static,
        corridor: impl RangeFinder + 'static,
    ) -> SchedulerBuilder<Set, M, T> {
        self.room = Some(Box::new(room));
        self.corridor = Some(Box::new(corridor));
        self.retype()
    }

    pub fn with_motion(mut self, motion: impl MotionInput + 'static) -> SchedulerBuilder<S, Set, T> {
        self.motion = Some(Box::new(motion));
        self.retype()
    }

    pub fn with_transmitter(mut self, tx: impl Transmitter + 'static) -> SchedulerBuilder<S, M, Set> {
        self.tx = Some(Box::new(tx));
        self.retype()
    }

    pub fn with_sensor_cfg(mut self, room: SensorCfg, corridor: SensorCfg) -> Self {
        self.room_cfg = room;
        self.corridor_cfg = corridor;
        self
    }

    pub fn with_calibration(mut self, cfg: CalibrationCfg) -> Self {
        self.calibration = cfg;
        self
    }

    pub fn with_power(mut self, cfg: PowerCfg) -> Self {
        self.power = cfg;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Take sensor, calibration and power settings from a loaded config file.
    pub fn apply_config(self, cfg: &roode_config::Config) -> Self {
        let room = SensorCfg::from_config(&cfg.sensors, &cfg.sensors.room);
        let corridor = SensorCfg::from_config(&cfg.sensors, &cfg.sensors.corridor);
        self.with_sensor_cfg(room, corridor)
            .with_calibration(CalibrationCfg::from(cfg))
            .with_power(PowerCfg::from(cfg))
    }

    /// Validate and build; fails with `BuildError` when a part is missing.
    pub fn try_build(self) -> Result<DynScheduler> {
        let room = self
            .room
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRoomSensor))?;
        let corridor = self
            .corridor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCorridorSensor))?;
        let motion = self
            .motion
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotion))?;
        let tx = self
            .tx
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransmitter))?;
        build_scheduler(
            room,
            corridor,
            motion,
            tx,
            self.room_cfg,
            self.corridor_cfg,
            self.calibration,
            self.power,
            self.clock,
        )
    }
}

impl SchedulerBuilder<Set, Set, Set> {
    pub fn build(self) -> Result<DynScheduler> {
        self.try_build()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate settings and construct a statically dispatched scheduler.
///
/// Shared by `SchedulerBuilder::try_build()`; use directly to avoid boxing.
#[allow(clippy::too_many_arguments)]
pub fn build_scheduler<R, M, T>(
    room: R,
    corridor: R,
    motion: M,
    tx: T,
    room_cfg: SensorCfg,
    corridor_cfg: SensorCfg,
    calibration: CalibrationCfg,
    power: PowerCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<PowerScheduler<R, M, T>>
where
    R: RangeFinder,
    M: MotionInput,
    T: Transmitter,
{
    for cfg in [&room_cfg, &corridor_cfg] {
        if cfg.threshold_mm == 0 || cfg.threshold_mm >= cfg.max_range_mm {
            return Err(invalid("threshold_mm must be in 1..max_range_mm"));
        }
        if cfg.miss_limit == 0 {
            return Err(invalid("miss_limit must be >= 1"));
        }
        if cfg.acquisition_timeout_ms == 0 {
            return Err(invalid("acquisition_timeout_ms must be >= 1"));
        }
    }
    if calibration.samples == 0 {
        return Err(invalid("calibration samples must be > 0"));
    }
    if !(0.0..1.0).contains(&calibration.margin_ratio) {
        return Err(invalid("margin_ratio must be in [0.0, 1.0)"));
    }
    if !(calibration.min_valid_ratio > 0.0 && calibration.min_valid_ratio <= 1.0) {
        return Err(invalid("min_valid_ratio must be in (0.0, 1.0]"));
    }
    if power.sample_rate_hz == 0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(PowerScheduler::from_parts(
        RangeSensor::new(room, Role::Room, room_cfg),
        RangeSensor::new(corridor, Role::Corridor, corridor_cfg),
        motion,
        tx,
        Calibrator::new(calibration, Arc::clone(&clock)),
        power,
        clock,
    ))
}
