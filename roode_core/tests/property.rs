use proptest::prelude::*;
use roode_core::{Direction, GateEngine, GateState, PresenceSample, SwitchState};

fn sample() -> impl Strategy<Value = PresenceSample> {
    (any::<bool>(), any::<bool>()).prop_map(|(room, corridor)| PresenceSample::new(room, corridor))
}

proptest! {
    #[test]
    fn counter_moves_by_one_and_mirrors_switch(seq in prop::collection::vec(sample(), 0..200)) {
        let mut g = GateEngine::new();
        let mut expected: i64 = 0;
        for s in seq {
            let before = g.count();
            if let Some(c) = g.advance(s) {
                expected = match c.direction {
                    Direction::Entering => expected + 1,
                    Direction::Leaving => (expected - 1).max(0),
                };
                prop_assert_eq!(c.count, g.count());
            } else {
                prop_assert_eq!(before, g.count());
            }
            prop_assert!(g.count().abs_diff(before) <= 1);
            prop_assert_eq!(i64::from(g.count()), expected);
            prop_assert_eq!(g.switch_state() == SwitchState::On, g.count() > 0);
            prop_assert_eq!(g.state(), GateState::from(s));
        }
    }

    #[test]
    fn single_sensor_traffic_never_counts(seq in prop::collection::vec(any::<bool>(), 0..100), room_side in any::<bool>()) {
        let mut g = GateEngine::new();
        for on in seq {
            let s = if room_side {
                PresenceSample::new(on, false)
            } else {
                PresenceSample::new(false, on)
            };
            prop_assert!(g.advance(s).is_none());
        }
        prop_assert_eq!(g.count(), 0);
    }
}
