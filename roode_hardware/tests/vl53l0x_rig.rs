#![cfg(all(feature = "hardware", target_os = "linux"))]

use std::time::Duration;

use rppal::gpio::Gpio;
use roode_hardware::vl53l0x::{Vl53l0x, open_bus};
use roode_traits::RangeFinder;

// These only pass on a Pi with both sensors wired (XSHUT on 17 and 27).
// Adjust pins for your rig.

#[test]
#[ignore = "needs a wired sensor rig"]
fn two_sensors_take_distinct_addresses() {
    let gpio = Gpio::new().expect("open gpio");
    let bus = open_bus(1).expect("open i2c");
    let mut room = Vl53l0x::new(bus.clone(), &gpio, 17, 0x30).expect("room xshut");
    let mut corridor = Vl53l0x::new(bus, &gpio, 27, 0x31).expect("corridor xshut");

    room.initialize().expect("room init");
    corridor.initialize().expect("corridor init");
    assert!(room.timing_budget_us() >= roode_hardware::vl53l0x_timing::MIN_TIMING_BUDGET_US);

    let t = Duration::from_millis(100);
    let _ = room.read_range(t).expect("room single shot");
    let _ = corridor.read_range(t).expect("corridor single shot");
}

#[test]
#[ignore = "needs a wired sensor rig"]
fn continuous_reads_complete_within_bound() {
    let gpio = Gpio::new().expect("open gpio");
    let bus = open_bus(1).expect("open i2c");
    let mut room = Vl53l0x::new(bus, &gpio, 17, 0x30).expect("room xshut");
    room.initialize().expect("room init");
    room.start_continuous().expect("start continuous");
    for _ in 0..10 {
        room.read_range(Duration::from_millis(100))
            .expect("continuous read");
    }
    room.stop_continuous().expect("stop continuous");
}
