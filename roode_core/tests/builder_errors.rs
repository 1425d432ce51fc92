use roode_core::error::BuildError;
use roode_core::mocks::{RecordingTransmitter, ScriptedFinder, ScriptedMotion};
use roode_core::{DynScheduler, PowerCfg, SensorCfg};
use rstest::rstest;

fn finder() -> ScriptedFinder {
    ScriptedFinder::new([]).with_fallback(1200)
}

#[rstest]
fn builder_missing_sensors_yields_typed_build_error() {
    let err = DynScheduler::builder()
        .with_motion(ScriptedMotion::new([]))
        .with_transmitter(RecordingTransmitter::new())
        .try_build()
        .expect_err("should fail with MissingRoomSensor");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingRoomSensor) => {}
        other => panic!("expected MissingRoomSensor, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_transmitter_yields_typed_build_error() {
    let err = DynScheduler::builder()
        .with_sensors(finder(), finder())
        .with_motion(ScriptedMotion::new([]))
        .try_build()
        .expect_err("should fail with MissingTransmitter");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingTransmitter)
    ));
}

#[rstest]
#[case::zero_rate(
    SensorCfg::default(),
    PowerCfg { sample_rate_hz: 0, ..PowerCfg::default() },
    "sample_rate_hz"
)]
#[case::threshold_beyond_range(
    SensorCfg { threshold_mm: 9000, ..SensorCfg::default() },
    PowerCfg::default(),
    "threshold_mm"
)]
#[case::zero_miss_limit(
    SensorCfg { miss_limit: 0, ..SensorCfg::default() },
    PowerCfg::default(),
    "miss_limit"
)]
fn invalid_settings_are_rejected(
    #[case] sensor: SensorCfg,
    #[case] power: PowerCfg,
    #[case] needle: &str,
) {
    let err = DynScheduler::builder()
        .with_sensors(finder(), finder())
        .with_motion(ScriptedMotion::new([]))
        .with_transmitter(RecordingTransmitter::new())
        .with_sensor_cfg(sensor.clone(), sensor)
        .with_power(power)
        .build()
        .expect_err("invalid settings must be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn config_file_settings_flow_into_scheduler() {
    let toml = r#"
        [sensors]
        max_range_mm = 4000
        [sensors.room]
        xshut_pin = 17
        address = 0x30
        threshold_mm = 700
        [sensors.corridor]
        xshut_pin = 27
        address = 0x31
        threshold_mm = 750
        [motion]
        pin = 22
        [power]
        policy = "always_on"
    "#;
    let cfg = roode_config::load_toml(toml).unwrap();
    cfg.validate().unwrap();
    let sched = DynScheduler::builder()
        .with_sensors(finder(), finder())
        .with_motion(ScriptedMotion::new([]))
        .with_transmitter(RecordingTransmitter::new())
        .apply_config(&cfg)
        .build()
        .unwrap();
    assert_eq!(sched.thresholds(), (700, 750));
    assert_eq!(sched.policy(), roode_core::PowerPolicy::AlwaysOn);
}
