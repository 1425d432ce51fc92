//! Drive a scheduler until shutdown, a tick budget or a sensor fault.

use std::sync::atomic::{AtomicBool, Ordering};

use roode_traits::{MotionInput, RangeFinder, Transmitter};

use crate::error::{Result, RoodeError};
use crate::gate::StepOutcome;
use crate::scheduler::{PowerScheduler, PowerState, TickOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown flag was raised.
    Shutdown,
    /// `max_ticks` iterations completed.
    TickBudget,
}

/// Totals for one run of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub crossings: u64,
    /// Ticks that ended with a sensor still in timeout.
    pub suspended_ticks: u64,
    pub wakeups: u64,
    pub count: u32,
    pub power_state: PowerState,
    pub stopped: StopReason,
}

/// Tick until `shutdown` is set or `max_ticks` is reached.
///
/// The shutdown flag is checked once per tick. A persistent sensor fault ends
/// the run with that error.
pub fn run<R, M, T>(
    sched: &mut PowerScheduler<R, M, T>,
    shutdown: &AtomicBool,
    max_ticks: Option<u64>,
) -> Result<RunSummary>
where
    R: RangeFinder,
    M: MotionInput,
    T: Transmitter,
{
    let mut ticks = 0u64;
    let mut crossings = 0u64;
    let mut suspended_ticks = 0u64;
    let mut wakeups = 0u64;

    let stopped = loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(ticks, "shutdown requested");
            break StopReason::Shutdown;
        }
        if max_ticks.is_some_and(|max| ticks >= max) {
            break StopReason::TickBudget;
        }

        let outcome = sched.tick()?;
        ticks += 1;
        let step = match outcome {
            TickOutcome::Faulted => {
                let err = sched
                    .fault()
                    .cloned()
                    .unwrap_or_else(|| RoodeError::HardwareFault("sensor fault".into()));
                return Err(eyre::Report::new(err));
            }
            TickOutcome::Suspended { .. } => {
                suspended_ticks += 1;
                None
            }
            TickOutcome::Idle => None,
            TickOutcome::Woke(s) => {
                wakeups += 1;
                Some(s)
            }
            TickOutcome::Stepped(s) | TickOutcome::Settled(s) => Some(s),
        };
        if let Some(StepOutcome::Crossed(_)) = step {
            crossings += 1;
        }
    };

    let summary = RunSummary {
        ticks,
        crossings,
        suspended_ticks,
        wakeups,
        count: sched.count(),
        power_state: sched.power_state(),
        stopped,
    };
    tracing::info!(
        ticks,
        crossings,
        count = summary.count,
        stopped = ?stopped,
        "run finished"
    );
    Ok(summary)
}
