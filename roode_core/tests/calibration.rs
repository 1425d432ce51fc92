use std::sync::Arc;
use std::time::Duration;

use roode_core::mocks::ScriptedFinder;
use roode_core::{CalibrationCfg, Calibrator, RangeSensor, RoodeError, SensorCfg, compute_threshold};
use roode_traits::Role;
use roode_traits::clock::test_clock::TestClock;
use rstest::rstest;

fn room_sensor(finder: ScriptedFinder) -> RangeSensor<ScriptedFinder> {
    RangeSensor::new(finder, Role::Room, SensorCfg::default())
}

#[rstest]
#[case::flat(vec![Some(1000); 20], 900)]
#[case::mixed(vec![Some(1100), Some(900), None, Some(8190)], 900)]
#[case::rounding(vec![Some(1001), Some(1002)], 901)]
fn threshold_is_mean_minus_margin(#[case] samples: Vec<Option<u16>>, #[case] expected: u16) {
    let r = compute_threshold(&samples, &CalibrationCfg::default()).unwrap();
    assert_eq!(r.threshold_mm, expected);
}

#[rstest]
fn identical_samples_give_identical_thresholds() {
    let samples: Vec<Option<u16>> = (0..20).map(|i| Some(1150 + (i * 7) % 40)).collect();
    let cfg = CalibrationCfg::default();
    let a = compute_threshold(&samples, &cfg).unwrap();
    let b = compute_threshold(&samples, &cfg).unwrap();
    assert_eq!(a, b);
}

#[rstest]
fn too_few_valid_samples_keep_prior_threshold() {
    let script = (0..20).map(|i| if i % 4 == 0 { Some(1000) } else { None });
    let mut sensor = room_sensor(ScriptedFinder::new(script));
    let cal = Calibrator::new(CalibrationCfg::default(), Arc::new(TestClock::new()));

    let err = cal.calibrate(&mut sensor).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RoodeError>(),
        Some(&RoodeError::CalibrationFailed {
            role: Role::Room,
            valid: 5,
            taken: 20,
            required: 10,
        })
    );
    assert_eq!(sensor.threshold(), 800);
}

#[rstest]
fn successful_calibration_clears_timeout() {
    let finder = ScriptedFinder::new([None, None, None]).with_fallback(1000);
    let mut sensor = room_sensor(finder);
    for _ in 0..3 {
        sensor.read();
    }
    assert!(sensor.timeout_occurred());

    let cal = Calibrator::new(CalibrationCfg::default(), Arc::new(TestClock::new()));
    let r = cal.calibrate(&mut sensor).unwrap();
    assert_eq!(r.threshold_mm, 900);
    assert_eq!(sensor.threshold(), 900);
    assert!(!sensor.timeout_occurred());
    assert_eq!(sensor.consecutive_misses(), 0);
}

#[rstest]
fn retry_uses_linear_backoff() {
    let clock = TestClock::new();
    let cal = Calibrator::new(
        CalibrationCfg {
            retries: 2,
            retry_backoff_ms: 100,
            ..CalibrationCfg::default()
        },
        Arc::new(clock.clone()),
    );
    let mut sensor = room_sensor(ScriptedFinder::new([]));
    assert!(cal.calibrate_with_retry(&mut sensor).is_err());
    // 100 ms after the first failure, 200 ms after the second.
    assert_eq!(clock.elapsed(), Duration::from_millis(300));
    assert_eq!(sensor.finder().reads(), 60);
}

#[rstest]
fn retry_stops_at_first_success() {
    let clock = TestClock::new();
    let cfg = CalibrationCfg {
        samples: 4,
        sample_interval_ms: 5,
        ..CalibrationCfg::default()
    };
    let cal = Calibrator::new(cfg, Arc::new(clock.clone()));
    let script = [None, None, None, None, Some(1000), Some(1000), Some(1000), Some(1000)];
    let mut sensor = room_sensor(ScriptedFinder::new(script));
    let r = cal.calibrate_with_retry(&mut sensor).unwrap();
    assert_eq!(r.valid, 4);
    // Two attempts of three sample gaps each, plus one 100 ms backoff.
    assert_eq!(clock.elapsed(), Duration::from_millis(130));
}
