#![no_main]
use libfuzzer_sys::fuzz_target;
use roode_core::{GateEngine, GateState, PresenceSample, SwitchState};

// Each byte is one sample: bit 0 = room, bit 1 = corridor.
fuzz_target!(|data: &[u8]| {
    let mut gate = GateEngine::new();
    for &b in data {
        let sample = PresenceSample::new(b & 0x01 != 0, b & 0x02 != 0);
        let before = gate.count();
        if let Some(c) = gate.advance(sample) {
            assert!(c.count.abs_diff(before) <= 1);
        }
        assert_eq!(gate.state(), GateState::from(sample));
        assert_eq!(gate.switch_state() == SwitchState::On, gate.count() > 0);
    }
});
