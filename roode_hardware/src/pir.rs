use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use roode_traits::MotionInput;

use crate::error::{HwError, Result};

/// PIR motion sensor on a GPIO input.
pub struct PirSensor {
    pin: InputPin,
    active_high: bool,
}

impl PirSensor {
    pub fn new(gpio: &Gpio, pin: u8, active_high: bool) -> Result<Self> {
        let pin = gpio.get(pin)?.into_input();
        Ok(Self { pin, active_high })
    }

    fn level_is_active(&self, level: Level) -> bool {
        (level == Level::High) == self.active_high
    }
}

impl MotionInput for PirSensor {
    fn is_active(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.level_is_active(self.pin.read()))
    }

    /// Sleep on the edge interrupt instead of polling the level.
    fn wait_for_motion(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        if self.is_active()? {
            return Ok(true);
        }
        let trigger = if self.active_high {
            Trigger::RisingEdge
        } else {
            Trigger::FallingEdge
        };
        self.pin.set_interrupt(trigger).map_err(HwError::from)?;
        let seen = self
            .pin
            .poll_interrupt(true, Some(timeout))
            .map_err(HwError::from)?;
        self.pin.clear_interrupt().map_err(HwError::from)?;
        Ok(seen.is_some_and(|level| self.level_is_active(level)))
    }
}
