//! Power-aware sampling loop around the gate engine.
//!
//! The scheduler owns both range sensors, the motion input and the
//! transmitter. Each `tick` polls motion once and, while the doorway is
//! awake, recovers timed-out sensors and steps the gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use roode_traits::clock::Clock;
use roode_traits::{Channel, MotionInput, RangeFinder, Transmitter};

use crate::calibration::Calibrator;
use crate::config::{PowerCfg, PowerPolicy};
use crate::error::{Result, RoodeError};
use crate::gate::{GateEngine, GateState, StepOutcome, SwitchState};
use crate::hw_error::map_hw_error;
use crate::publish::{present, send, send_labeled};
use crate::sensor::{RangeSensor, SensorMode};
use crate::util::period_ms;

/// Cap on the recovery backoff multiplier.
const MAX_RECOVERY_BACKOFF_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Idle,
    Awake,
}

/// What one `tick` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No motion; sensors stay idle.
    Idle,
    /// Motion rising edge: sensors switched to continuous and the gate stepped.
    Woke(StepOutcome),
    Stepped(StepOutcome),
    /// Motion stayed low for the settle period: last step taken, sensors idle.
    Settled(StepOutcome),
    /// Recalibration left `timed_out` sensors in timeout; nothing was stepped.
    /// The sensors may still have gone idle if motion settled.
    Suspended { timed_out: u8 },
    /// A sensor failed to initialize; the scheduler will not wake.
    Faulted,
}

pub struct PowerScheduler<R: RangeFinder, M: MotionInput, T: Transmitter> {
    room: RangeSensor<R>,
    corridor: RangeSensor<R>,
    motion: M,
    tx: T,
    gate: GateEngine,
    calibrator: Calibrator,
    power: PowerCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    state: PowerState,
    last_motion: bool,
    last_motion_at_ms: u64,
    failed_recoveries: u32,
    fault: Option<RoodeError>,
}

impl<R: RangeFinder, M: MotionInput, T: Transmitter> core::fmt::Debug for PowerScheduler<R, M, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PowerScheduler")
            .field("state", &self.state)
            .field("policy", &self.power.policy)
            .field("gate", &self.gate)
            .field("room", &self.room)
            .field("corridor", &self.corridor)
            .field("fault", &self.fault)
            .finish()
    }
}

impl<R: RangeFinder, M: MotionInput, T: Transmitter> PowerScheduler<R, M, T> {
    pub(crate) fn from_parts(
        room: RangeSensor<R>,
        corridor: RangeSensor<R>,
        motion: M,
        tx: T,
        calibrator: Calibrator,
        power: PowerCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            room,
            corridor,
            motion,
            tx,
            gate: GateEngine::new(),
            calibrator,
            power,
            clock,
            epoch,
            state: PowerState::Idle,
            last_motion: false,
            last_motion_at_ms: 0,
            failed_recoveries: 0,
            fault: None,
        }
    }

    /// Device boot sequence after transport bring-up.
    ///
    /// A sensor that fails to initialize is recorded as a persistent fault and
    /// the error is returned; later ticks report `TickOutcome::Faulted`.
    pub fn startup(&mut self) -> Result<()> {
        present(&mut self.tx);

        for sensor in [&mut self.room, &mut self.corridor] {
            if let Err(e) = sensor.initialize() {
                self.fault = e.downcast_ref::<RoodeError>().cloned();
                return Err(e);
            }
        }

        if self.power.warmup_ms > 0 {
            tracing::debug!(warmup_ms = self.power.warmup_ms, "waiting for motion sensor warm-up");
            self.clock.sleep(Duration::from_millis(self.power.warmup_ms));
        }

        if self.calibrator.cfg().enabled {
            for sensor in [&mut self.room, &mut self.corridor] {
                if self.calibrator.calibrate_with_retry(sensor).is_err() {
                    tracing::warn!(
                        role = %sensor.role(),
                        threshold_mm = sensor.threshold(),
                        "startup calibration failed, using configured threshold"
                    );
                }
            }
        }

        send_labeled(&mut self.tx, Channel::RoomSwitch, 0, "Off");
        send(&mut self.tx, Channel::PeopleCounter, 0);
        let (room_mm, corridor_mm) = self.thresholds();
        tracing::info!(room_mm, corridor_mm, policy = ?self.power.policy, "gate ready");
        Ok(())
    }

    /// One control-loop iteration.
    ///
    /// Sensor mode commands that fail are logged and retried on the next tick;
    /// the only error a tick surfaces is a persistent fault.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.fault.is_some() {
            return Ok(TickOutcome::Faulted);
        }

        let motion = self.poll_motion();
        let now_ms = self.clock.ms_since(self.epoch);
        if motion {
            self.last_motion_at_ms = now_ms;
        }
        let rising = motion && !self.last_motion;
        self.last_motion = motion;

        let mut woke = false;
        if self.state == PowerState::Idle {
            match self.power.policy {
                PowerPolicy::AlwaysOn => {}
                _ if motion => {
                    if rising {
                        tracing::debug!("motion rising edge");
                    }
                }
                PowerPolicy::MotionGated => {
                    self.clock
                        .sleep(Duration::from_millis(self.power.idle_poll_ms));
                    return Ok(TickOutcome::Idle);
                }
                // Already blocked on the motion interrupt in `poll_motion`.
                PowerPolicy::MotionSleep => return Ok(TickOutcome::Idle),
            }
            if !self.wake() {
                self.clock
                    .sleep(Duration::from_millis(self.power.idle_poll_ms));
                return Ok(TickOutcome::Idle);
            }
            woke = true;
        }

        // A timed-out sensor is recalibrated before the gate reads it again,
        // including a timeout carried over from before the last settle.
        let timed_out = if self.room.timeout_occurred() || self.corridor.timeout_occurred() {
            self.recover()
        } else {
            0
        };
        let step = (timed_out == 0).then(|| self.step());

        let quiet_ms = now_ms.saturating_sub(self.last_motion_at_ms);
        let settled = self.power.policy != PowerPolicy::AlwaysOn
            && !motion
            && quiet_ms >= self.power.settle_ms
            && self.go_idle();

        let outcome = match step {
            None => TickOutcome::Suspended { timed_out },
            Some(s) if woke => TickOutcome::Woke(s),
            Some(s) if settled => TickOutcome::Settled(s),
            Some(s) => TickOutcome::Stepped(s),
        };

        if timed_out > 0 {
            self.clock.sleep(self.recovery_backoff());
        } else if self.state == PowerState::Awake {
            self.clock
                .sleep(Duration::from_millis(period_ms(self.power.sample_rate_hz)));
        }
        Ok(outcome)
    }

    fn poll_motion(&mut self) -> bool {
        let res = match (self.power.policy, self.state) {
            (PowerPolicy::MotionSleep, PowerState::Idle) => self
                .motion
                .wait_for_motion(Duration::from_millis(self.power.sleep_timeout_ms)),
            _ => self.motion.is_active(),
        };
        match res {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(error = %map_hw_error(&*e), "motion read failed, keeping last level");
                self.last_motion
            }
        }
    }

    fn step(&mut self) -> StepOutcome {
        self.gate
            .step(&mut self.room, &mut self.corridor, &mut self.tx)
    }

    fn set_modes(&mut self, mode: SensorMode) -> Result<()> {
        self.room.set_mode(mode)?;
        self.corridor.set_mode(mode)
    }

    /// Switch both sensors to continuous. On failure both are put back to idle
    /// and the scheduler stays idle.
    fn wake(&mut self) -> bool {
        if let Err(e) = self.set_modes(SensorMode::Continuous) {
            let error = format!("{e:#}");
            tracing::warn!(%error, "wake failed, staying idle");
            if let Err(e) = self.set_modes(SensorMode::Idle) {
                let error = format!("{e:#}");
                tracing::debug!(%error, "could not return sensors to idle");
            }
            return false;
        }
        self.state = PowerState::Awake;
        tracing::info!(policy = ?self.power.policy, "awake");
        true
    }

    /// Switch both sensors to idle. On failure the scheduler stays awake.
    fn go_idle(&mut self) -> bool {
        if let Err(e) = self.set_modes(SensorMode::Idle) {
            let error = format!("{e:#}");
            tracing::warn!(%error, "could not idle sensors, staying awake");
            return false;
        }
        self.state = PowerState::Idle;
        tracing::info!(count = self.gate.count(), "motion settled, sensors idle");
        true
    }

    /// Recalibrate timed-out sensors and report both thresholds.
    /// Returns how many sensors are still in timeout.
    fn recover(&mut self) -> u8 {
        for sensor in [&mut self.room, &mut self.corridor] {
            if sensor.timeout_occurred() {
                tracing::warn!(role = %sensor.role(), "sensor timed out, recalibrating");
                // Failure is logged by the calibrator; the report below carries it.
                let _ = self.calibrator.calibrate(sensor);
            }
        }
        let timed_out =
            u8::from(self.room.timeout_occurred()) + u8::from(self.corridor.timeout_occurred());
        let label = format!("{},{}", self.room.threshold(), self.corridor.threshold());
        send_labeled(
            &mut self.tx,
            Channel::ThresholdReport,
            i32::from(timed_out),
            &label,
        );
        if timed_out > 0 {
            self.failed_recoveries = self.failed_recoveries.saturating_add(1);
        } else {
            self.failed_recoveries = 0;
        }
        timed_out
    }

    /// Pause after a failed recovery: `retry_backoff_ms` per consecutive
    /// failure up to a cap, and never shorter than the awake period.
    fn recovery_backoff(&self) -> Duration {
        let steps = u64::from(self.failed_recoveries.min(MAX_RECOVERY_BACKOFF_STEPS));
        let backoff = self.calibrator.cfg().retry_backoff_ms.saturating_mul(steps);
        Duration::from_millis(backoff.max(period_ms(self.power.sample_rate_hz)))
    }

    pub fn power_state(&self) -> PowerState {
        self.state
    }

    pub fn count(&self) -> u32 {
        self.gate.count()
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn switch_state(&self) -> SwitchState {
        self.gate.switch_state()
    }

    pub fn fault(&self) -> Option<&RoodeError> {
        self.fault.as_ref()
    }

    /// Current `(room, corridor)` presence thresholds in millimeters.
    pub fn thresholds(&self) -> (u16, u16) {
        (self.room.threshold(), self.corridor.threshold())
    }

    pub fn room(&self) -> &RangeSensor<R> {
        &self.room
    }

    pub fn corridor(&self) -> &RangeSensor<R> {
        &self.corridor
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    pub fn transmitter(&self) -> &T {
        &self.tx
    }

    pub fn policy(&self) -> PowerPolicy {
        self.power.policy
    }
}
