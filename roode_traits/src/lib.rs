//! Hardware seams shared by the gate engine, the I/O backends and the CLI.
//!
//! Device errors cross these traits as `Box<dyn Error + Send + Sync>`; the core
//! maps them to its typed error enum.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::fmt;
use std::time::Duration;

/// One time-of-flight ranging device on the shared sensor bus.
pub trait RangeFinder {
    /// Bring the device out of reset and move it to its configured bus address.
    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Latest distance in millimeters, waiting at most `timeout` for a result.
    fn read_range(
        &mut self,
        timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;

    fn start_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Passive infrared motion input (digital, sampled once per tick).
pub trait MotionInput {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Block until motion is reported or `timeout` elapses; returns the level seen.
    ///
    /// Inputs without interrupt support fall back to a single level read.
    fn wait_for_motion(
        &mut self,
        _timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        self.is_active()
    }
}

/// Controller-side channels the device publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Binary "room occupied" switch.
    RoomSwitch,
    /// Number of people currently in the room.
    PeopleCounter,
    /// Diagnostic text with both presence thresholds.
    ThresholdReport,
}

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::RoomSwitch,
        Channel::PeopleCounter,
        Channel::ThresholdReport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::RoomSwitch => "room_switch",
            Channel::PeopleCounter => "people_counter",
            Channel::ThresholdReport => "threshold_report",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outbound publish contract towards the home-automation controller.
///
/// Delivery is best effort: callers log failures and carry on.
pub trait Transmitter {
    /// Register the device's channels with the controller (once, at startup).
    fn presentation(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn transmit(
        &mut self,
        channel: Channel,
        value: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn transmit_labeled(
        &mut self,
        channel: Channel,
        value: i32,
        label: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Transmitter + ?Sized> Transmitter for Box<T> {
    fn presentation(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).presentation()
    }

    fn transmit(
        &mut self,
        channel: Channel,
        value: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).transmit(channel, value)
    }

    fn transmit_labeled(
        &mut self,
        channel: Channel,
        value: i32,
        label: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).transmit_labeled(channel, value, label)
    }
}

impl<R: RangeFinder + ?Sized> RangeFinder for Box<R> {
    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).initialize()
    }

    fn read_range(
        &mut self,
        timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_range(timeout)
    }

    fn start_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).start_continuous()
    }

    fn stop_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).stop_continuous()
    }
}

impl<M: MotionInput + ?Sized> MotionInput for Box<M> {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).is_active()
    }

    fn wait_for_motion(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).wait_for_motion(timeout)
    }
}

/// Which side of the doorway a range sensor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Room,
    Corridor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Room => "room",
            Role::Corridor => "corridor",
        })
    }
}
