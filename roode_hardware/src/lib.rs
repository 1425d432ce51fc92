//! I/O wrappers around the gate engine: simulated devices, transmitter
//! backends and (feature `hardware`) the Raspberry Pi drivers.
pub mod error;
pub mod transport;
pub mod util;
pub mod vl53l0x_timing;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pir;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod vl53l0x;

use roode_traits::{MotionInput, RangeFinder, Role};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::HwError;

pub use transport::{DomoticzIdx, DomoticzMqtt, MySensorsSerial};

/// GPIO and bus wiring of one doorway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorwayPins {
    pub i2c_bus: u8,
    pub room_xshut: u8,
    pub room_address: u8,
    pub corridor_xshut: u8,
    pub corridor_address: u8,
    pub pir_pin: u8,
    pub pir_active_high: bool,
}

/// Claim both range sensors (held in reset) and the PIR input.
///
/// The sensors still answer on the factory address; `RangeFinder::initialize`
/// moves each one to its configured address in turn.
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn open_doorway(
    pins: &DoorwayPins,
) -> Result<(vl53l0x::Vl53l0x, vl53l0x::Vl53l0x, pir::PirSensor), HwError> {
    let gpio = rppal::gpio::Gpio::new()?;
    let bus = vl53l0x::open_bus(pins.i2c_bus)?;
    let room = vl53l0x::Vl53l0x::new(Rc::clone(&bus), &gpio, pins.room_xshut, pins.room_address)?;
    let corridor = vl53l0x::Vl53l0x::new(bus, &gpio, pins.corridor_xshut, pins.corridor_address)?;
    let motion = pir::PirSensor::new(&gpio, pins.pir_pin, pins.pir_active_high)?;
    tracing::info!(i2c_bus = pins.i2c_bus, pir_pin = pins.pir_pin, "doorway hardware claimed");
    Ok((room, corridor, motion))
}

/// One tick of a scripted doorway: what each sensor sees and the PIR level.
///
/// `None` distances simulate an acquisition that never completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneFrame {
    pub room_mm: Option<u16>,
    pub corridor_mm: Option<u16>,
    pub motion: bool,
}

#[derive(Debug)]
struct SceneState {
    frames: Vec<SceneFrame>,
    cursor: usize,
    current: Option<SceneFrame>,
    ambient_mm: u16,
    claimed: Vec<u8>,
}

/// Shared doorway model behind the simulated devices.
///
/// Each motion poll advances the script by one frame, so the PIR read is the
/// tick boundary. Range finders report the current frame only while in
/// continuous mode; idle (single-shot) reads and reads outside the script see
/// the empty doorway at `ambient_mm`.
#[derive(Debug, Clone)]
pub struct SimScene {
    inner: Rc<RefCell<SceneState>>,
}

impl SimScene {
    pub fn new(ambient_mm: u16) -> Self {
        Self::with_frames(ambient_mm, Vec::new())
    }

    pub fn with_frames(ambient_mm: u16, frames: Vec<SceneFrame>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SceneState {
                frames,
                cursor: 0,
                current: None,
                ambient_mm,
                claimed: Vec::new(),
            })),
        }
    }

    pub fn push(&self, frame: SceneFrame) {
        self.inner.borrow_mut().frames.push(frame);
    }

    /// True once every scripted frame has been played.
    pub fn is_exhausted(&self) -> bool {
        let s = self.inner.borrow();
        s.cursor >= s.frames.len()
    }

    pub fn remaining(&self) -> usize {
        let s = self.inner.borrow();
        s.frames.len().saturating_sub(s.cursor)
    }

    fn advance(&self) -> bool {
        let mut s = self.inner.borrow_mut();
        let frame = s.frames.get(s.cursor).copied();
        if frame.is_some() {
            s.cursor += 1;
        }
        s.current = frame;
        frame.map(|f| f.motion).unwrap_or(false)
    }

    fn live_distance(&self, role: Role) -> Option<u16> {
        let s = self.inner.borrow();
        match s.current {
            Some(f) => match role {
                Role::Room => f.room_mm,
                Role::Corridor => f.corridor_mm,
            },
            None => Some(s.ambient_mm),
        }
    }

    fn ambient(&self) -> u16 {
        self.inner.borrow().ambient_mm
    }

    fn claim(&self, address: u8) -> Result<(), HwError> {
        let mut s = self.inner.borrow_mut();
        if s.claimed.contains(&address) {
            return Err(HwError::AddressConflict(address));
        }
        s.claimed.push(address);
        Ok(())
    }
}

/// Simulated VL53L0X attached to a [`SimScene`].
pub struct SimulatedRangeFinder {
    scene: SimScene,
    role: Role,
    address: u8,
    continuous: bool,
    responding: bool,
    initialized: bool,
}

impl SimulatedRangeFinder {
    pub fn new(scene: SimScene, role: Role, address: u8) -> Self {
        Self {
            scene,
            role,
            address,
            continuous: false,
            responding: true,
            initialized: false,
        }
    }

    /// Simulate a device that never answers on the bus.
    pub fn unresponsive(mut self) -> Self {
        self.responding = false;
        self
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }
}

impl RangeFinder for SimulatedRangeFinder {
    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.responding {
            return Err(Box::new(HwError::NotResponding {
                address: 0x29,
                model_id: 0x00,
            }));
        }
        if !self.initialized {
            self.scene.claim(self.address)?;
            self.initialized = true;
        }
        tracing::debug!(role = %self.role, address = self.address, "simulated range sensor up");
        Ok(())
    }

    fn read_range(
        &mut self,
        _timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        if !self.initialized {
            return Err(Box::new(HwError::Timeout));
        }
        let reading = if self.continuous {
            self.scene.live_distance(self.role)
        } else {
            Some(self.scene.ambient())
        };
        match reading {
            Some(mm) => {
                tracing::trace!(role = %self.role, mm, "simulated range read");
                Ok(mm)
            }
            None => Err(Box::new(HwError::Timeout)),
        }
    }

    fn start_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.continuous = true;
        Ok(())
    }

    fn stop_continuous(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.continuous = false;
        Ok(())
    }
}

/// Simulated PIR input; every poll advances the scene by one frame.
pub struct SimulatedMotion {
    scene: SimScene,
}

impl SimulatedMotion {
    pub fn new(scene: SimScene) -> Self {
        Self { scene }
    }
}

impl MotionInput for SimulatedMotion {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.scene.advance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(room: u16, corridor: u16, motion: bool) -> SceneFrame {
        SceneFrame {
            room_mm: Some(room),
            corridor_mm: Some(corridor),
            motion,
        }
    }

    #[test]
    fn idle_reads_see_ambient_and_continuous_reads_follow_script() {
        let scene = SimScene::with_frames(1200, vec![frame(900, 400, true)]);
        let mut room = SimulatedRangeFinder::new(scene.clone(), Role::Room, 0x30);
        let mut corridor = SimulatedRangeFinder::new(scene.clone(), Role::Corridor, 0x31);
        let mut pir = SimulatedMotion::new(scene.clone());
        room.initialize().unwrap();
        corridor.initialize().unwrap();

        assert!(pir.is_active().unwrap());
        let t = Duration::from_millis(10);
        assert_eq!(corridor.read_range(t).unwrap(), 1200);

        corridor.start_continuous().unwrap();
        room.start_continuous().unwrap();
        assert_eq!(corridor.read_range(t).unwrap(), 400);
        assert_eq!(room.read_range(t).unwrap(), 900);

        assert!(!pir.is_active().unwrap());
        assert!(scene.is_exhausted());
        assert_eq!(room.read_range(t).unwrap(), 1200);
    }

    #[test]
    fn missing_frame_value_times_out() {
        let scene = SimScene::with_frames(
            1200,
            vec![SceneFrame {
                room_mm: None,
                corridor_mm: Some(1200),
                motion: true,
            }],
        );
        let mut room = SimulatedRangeFinder::new(scene.clone(), Role::Room, 0x30);
        room.initialize().unwrap();
        room.start_continuous().unwrap();
        SimulatedMotion::new(scene).is_active().unwrap();
        let err = room.read_range(Duration::from_millis(5)).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn duplicate_bus_address_is_rejected() {
        let scene = SimScene::new(1000);
        let mut a = SimulatedRangeFinder::new(scene.clone(), Role::Room, 0x30);
        let mut b = SimulatedRangeFinder::new(scene, Role::Corridor, 0x30);
        a.initialize().unwrap();
        let err = b.initialize().unwrap_err();
        assert!(err.to_string().contains("already claimed"));
    }

    #[test]
    fn unresponsive_sensor_fails_initialize() {
        let mut s = SimulatedRangeFinder::new(SimScene::new(1000), Role::Room, 0x30).unresponsive();
        assert!(s.initialize().is_err());
    }
}
