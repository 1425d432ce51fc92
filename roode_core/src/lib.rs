#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Occupancy-gate engine (hardware-agnostic).
//!
//! Two time-of-flight sensors watch a doorway, one facing the room and one the
//! corridor. All device access goes through `roode_traits::RangeFinder`,
//! `roode_traits::MotionInput` and `roode_traits::Transmitter`.
//!
//! ## Architecture
//!
//! - **Sensor**: reading, miss counting and presence test (`sensor` module)
//! - **Calibration**: ambient threshold computation and retry (`calibration` module)
//! - **Gate**: crossing-direction state machine and counter (`gate` module)
//! - **Scheduler**: motion-gated power management and recovery (`scheduler` module)
//! - **Builder**: validated construction (`builder` module)
//! - **Runner**: the control loop with shutdown handling (`runner` module)

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod gate;
pub mod hw_error;
pub mod mocks;
mod publish;
pub mod runner;
pub mod scheduler;
pub mod sensor;
pub mod util;

pub use builder::{DynScheduler, Missing, SchedulerBuilder, Set, build_scheduler};
pub use calibration::{CalibrationResult, Calibrator, compute_threshold};
pub use config::{CalibrationCfg, DEFAULT_THRESHOLD_MM, PowerCfg, PowerPolicy, SensorCfg};
pub use error::{BuildError, Result, RoodeError};
pub use gate::{
    Crossing, Direction, GateEngine, GateState, PresenceSample, StepOutcome, SwitchState,
};
pub use runner::{RunSummary, StopReason, run};
pub use scheduler::{PowerScheduler, PowerState, TickOutcome};
pub use sensor::{RangeSensor, SensorMode};
