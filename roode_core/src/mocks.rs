//! Test and helper mocks for roode_core

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use roode_traits::{Channel, MotionInput, RangeFinder, Transmitter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Range finder that replays a fixed list of readings; `None` is a timed-out acquisition.
///
/// Once the script runs out every read returns `fallback` (a timeout by default).
#[derive(Debug, Default)]
pub struct ScriptedFinder {
    script: VecDeque<Option<u16>>,
    fallback: Option<u16>,
    fail_init: bool,
    continuous: bool,
    mode_commands: u32,
    mode_attempts: u32,
    nacked: Vec<u32>,
    reads: u32,
}

impl ScriptedFinder {
    pub fn new(script: impl IntoIterator<Item = Option<u16>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Keep reporting `mm` once the script is exhausted.
    pub fn with_fallback(mut self, mm: u16) -> Self {
        self.fallback = Some(mm);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Reject the given start/stop commands, counted from 1 in issue order.
    pub fn nacking_mode_commands(mut self, attempts: impl IntoIterator<Item = u32>) -> Self {
        self.nacked = attempts.into_iter().collect();
        self
    }

    /// Number of start/stop continuous commands that took effect.
    pub fn mode_commands(&self) -> u32 {
        self.mode_commands
    }

    fn mode_command(&mut self, continuous: bool) -> Result<(), BoxError> {
        self.mode_attempts += 1;
        if self.nacked.contains(&self.mode_attempts) {
            return Err("mode command NACK".into());
        }
        self.mode_commands += 1;
        self.continuous = continuous;
        Ok(())
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }
}

impl RangeFinder for ScriptedFinder {
    fn initialize(&mut self) -> Result<(), BoxError> {
        if self.fail_init {
            return Err("device did not answer on 0x29".into());
        }
        Ok(())
    }

    fn read_range(&mut self, _timeout: Duration) -> Result<u16, BoxError> {
        self.reads += 1;
        let next = self.script.pop_front().unwrap_or(self.fallback);
        next.ok_or_else(|| "acquisition timeout".into())
    }

    fn start_continuous(&mut self) -> Result<(), BoxError> {
        self.mode_command(true)
    }

    fn stop_continuous(&mut self) -> Result<(), BoxError> {
        self.mode_command(false)
    }
}

/// Motion input replaying a fixed list of levels, then reporting no motion.
#[derive(Debug, Default)]
pub struct ScriptedMotion {
    levels: VecDeque<bool>,
    waits: u32,
}

impl ScriptedMotion {
    pub fn new(levels: impl IntoIterator<Item = bool>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            waits: 0,
        }
    }

    pub fn waits(&self) -> u32 {
        self.waits
    }
}

impl MotionInput for ScriptedMotion {
    fn is_active(&mut self) -> Result<bool, BoxError> {
        Ok(self.levels.pop_front().unwrap_or(false))
    }

    fn wait_for_motion(&mut self, _timeout: Duration) -> Result<bool, BoxError> {
        self.waits += 1;
        self.is_active()
    }
}

/// One publish seen by a [`RecordingTransmitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    Presentation,
    Value(Channel, i32),
    Labeled(Channel, i32, String),
}

/// Transmitter that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransmitter {
    log: Rc<RefCell<Vec<Published>>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.log.borrow().clone()
    }

    /// Values sent on `channel`, labeled or not, in order.
    pub fn values(&self, channel: Channel) -> Vec<i32> {
        self.log
            .borrow()
            .iter()
            .filter_map(|p| match p {
                Published::Value(c, v) | Published::Labeled(c, v, _) if *c == channel => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl Transmitter for RecordingTransmitter {
    fn presentation(&mut self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Published::Presentation);
        Ok(())
    }

    fn transmit(&mut self, channel: Channel, value: i32) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Published::Value(channel, value));
        Ok(())
    }

    fn transmit_labeled(&mut self, channel: Channel, value: i32, label: &str) -> Result<(), BoxError> {
        self.log
            .borrow_mut()
            .push(Published::Labeled(channel, value, label.to_owned()));
        Ok(())
    }
}

/// Transmitter whose link is always down.
#[derive(Debug, Default)]
pub struct FailingTransmitter;

impl Transmitter for FailingTransmitter {
    fn presentation(&mut self) -> Result<(), BoxError> {
        Err("link down".into())
    }

    fn transmit(&mut self, _channel: Channel, _value: i32) -> Result<(), BoxError> {
        Err("link down".into())
    }

    fn transmit_labeled(&mut self, _channel: Channel, _value: i32, _label: &str) -> Result<(), BoxError> {
        Err("link down".into())
    }
}
