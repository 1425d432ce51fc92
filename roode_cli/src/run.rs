//! Device assembly (hardware or simulator), transmitter selection, and the
//! bodies of the `run`, `calibrate` and `self-check` commands.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use roode_config::{Config, ReplayRow, TransportBackend};
use roode_core::error::Result as CoreResult;
use roode_core::util::period_ms;
use roode_core::{
    CalibrationCfg, CalibrationResult, Calibrator, DynScheduler, RangeSensor, RunSummary,
    SensorCfg,
};
use roode_hardware::{
    DomoticzIdx, DomoticzMqtt, MySensorsSerial, SceneFrame, SimScene, SimulatedMotion,
    SimulatedRangeFinder,
};
use roode_traits::clock::MonotonicClock;
use roode_traits::{MotionInput, RangeFinder, Role, Transmitter};

/// The three doorway devices, boxed for either backend.
pub struct Doorway {
    pub room: Box<dyn RangeFinder>,
    pub corridor: Box<dyn RangeFinder>,
    pub motion: Box<dyn MotionInput>,
}

fn sim_doorway(cfg: &Config, replay: &[ReplayRow], ambient_mm: u16) -> Doorway {
    let frames = replay
        .iter()
        .map(|r| SceneFrame {
            room_mm: r.room_mm,
            corridor_mm: r.corridor_mm,
            motion: r.motion,
        })
        .collect();
    let scene = SimScene::with_frames(ambient_mm, frames);
    tracing::info!(ambient_mm, frames = scene.remaining(), "using simulated doorway");
    Doorway {
        room: Box::new(SimulatedRangeFinder::new(
            scene.clone(),
            Role::Room,
            cfg.sensors.room.address,
        )),
        corridor: Box::new(SimulatedRangeFinder::new(
            scene.clone(),
            Role::Corridor,
            cfg.sensors.corridor.address,
        )),
        motion: Box::new(SimulatedMotion::new(scene)),
    }
}

/// Real sensors with the `hardware` feature, unless a replay script is given.
pub fn open_doorway(
    cfg: &Config,
    replay: Option<&[ReplayRow]>,
    ambient_mm: u16,
) -> CoreResult<Doorway> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if replay.is_none() {
        use eyre::WrapErr;
        let pins = roode_hardware::DoorwayPins {
            i2c_bus: cfg.hardware.i2c_bus,
            room_xshut: cfg.sensors.room.xshut_pin,
            room_address: cfg.sensors.room.address,
            corridor_xshut: cfg.sensors.corridor.xshut_pin,
            corridor_address: cfg.sensors.corridor.address,
            pir_pin: cfg.motion.pin,
            pir_active_high: cfg.motion.active_high,
        };
        let (room, corridor, motion) =
            roode_hardware::open_doorway(&pins).wrap_err("open doorway hardware")?;
        return Ok(Doorway {
            room: Box::new(room),
            corridor: Box::new(corridor),
            motion: Box::new(motion),
        });
    }
    Ok(sim_doorway(cfg, replay.unwrap_or_default(), ambient_mm))
}

/// Transmitter backend from `[transport]`, writing lines to stdout.
pub fn make_transmitter(cfg: &Config) -> Box<dyn Transmitter> {
    let out = std::io::stdout();
    match cfg.transport.backend {
        TransportBackend::Mqtt => {
            let idx = &cfg.transport.idx;
            Box::new(DomoticzMqtt::new(
                out,
                cfg.transport.topic.clone(),
                DomoticzIdx {
                    room_switch: idx.room_switch,
                    people_counter: idx.people_counter,
                    threshold: idx.threshold,
                },
            ))
        }
        TransportBackend::MySensors => Box::new(MySensorsSerial::new(out, cfg.transport.node_id)),
    }
}

/// Ticks needed to play a replay script and let motion settle afterwards.
fn replay_budget(frames: usize, cfg: &Config) -> u64 {
    let settle_ticks = cfg
        .power
        .settle_ms
        .div_ceil(period_ms(cfg.power.sample_rate_hz));
    frames as u64 + settle_ticks + 1
}

pub fn run_gate(
    cfg: &Config,
    max_ticks: Option<u64>,
    replay: Option<&Path>,
    ambient_mm: u16,
    shutdown: &AtomicBool,
) -> CoreResult<RunSummary> {
    let rows = replay.map(roode_config::load_replay_csv).transpose()?;
    let budget = max_ticks.or_else(|| rows.as_ref().map(|r| replay_budget(r.len(), cfg)));
    let doorway = open_doorway(cfg, rows.as_deref(), ambient_mm)?;

    let mut sched = DynScheduler::builder()
        .with_sensors(doorway.room, doorway.corridor)
        .with_motion(doorway.motion)
        .with_transmitter(make_transmitter(cfg))
        .apply_config(cfg)
        .build()?;
    sched.startup()?;
    tracing::info!(max_ticks = ?budget, policy = ?sched.policy(), "run start");
    roode_core::run(&mut sched, shutdown, budget)
}

/// Threshold from an ambient-sample CSV, without touching any sensor.
pub fn calibrate_offline(cfg: &Config, samples: &Path) -> CoreResult<CalibrationResult> {
    let samples = roode_config::load_ambient_csv(samples)?;
    let result = roode_core::compute_threshold(&samples, &CalibrationCfg::from(cfg))?;
    Ok(result)
}

/// Initialize both sensors and calibrate each against the empty doorway.
pub fn calibrate_live(cfg: &Config, ambient_mm: u16) -> CoreResult<Vec<(Role, CalibrationResult)>> {
    let doorway = open_doorway(cfg, None, ambient_mm)?;
    let calibrator = Calibrator::new(CalibrationCfg::from(cfg), Arc::new(MonotonicClock::new()));
    let mut out = Vec::with_capacity(2);
    for (role, finder, pins) in [
        (Role::Room, doorway.room, &cfg.sensors.room),
        (Role::Corridor, doorway.corridor, &cfg.sensors.corridor),
    ] {
        let mut sensor = RangeSensor::new(finder, role, SensorCfg::from_config(&cfg.sensors, pins));
        sensor.initialize()?;
        let result = calibrator.calibrate_with_retry(&mut sensor)?;
        out.push((role, result));
    }
    Ok(out)
}

/// Bring up both sensors and take one reading from each.
pub fn self_check(cfg: &Config, ambient_mm: u16) -> CoreResult<Vec<(Role, Option<u16>)>> {
    let doorway = open_doorway(cfg, None, ambient_mm)?;
    let mut out = Vec::with_capacity(2);
    for (role, finder, pins) in [
        (Role::Room, doorway.room, &cfg.sensors.room),
        (Role::Corridor, doorway.corridor, &cfg.sensors.corridor),
    ] {
        let mut sensor = RangeSensor::new(finder, role, SensorCfg::from_config(&cfg.sensors, pins));
        sensor.initialize()?;
        out.push((role, sensor.read()));
    }
    Ok(out)
}
