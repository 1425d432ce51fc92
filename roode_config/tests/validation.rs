use roode_config::{PowerPolicy, TransportBackend, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[sensors]
max_range_mm = 8190
acquisition_timeout_ms = 50
miss_limit = 3

[sensors.room]
xshut_pin = 17
address = 0x30

[sensors.corridor]
xshut_pin = 27
address = 0x31

[motion]
pin = 22
"#;

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.calibration.samples, 20);
    assert!((cfg.calibration.margin_ratio - 0.10).abs() < 1e-6);
    assert_eq!(cfg.power.policy, PowerPolicy::MotionGated);
    assert_eq!(cfg.transport.backend, TransportBackend::Mqtt);
    assert_eq!(cfg.transport.topic, "domoticz/in");
    assert!(cfg.motion.active_high);
}

#[test]
fn parses_full_sections() {
    let toml = format!(
        "{BASE}\n{}",
        r#"
[calibration]
enabled = true
samples = 30
margin_ratio = 0.15
min_valid_ratio = 0.6
retries = 1
retry_backoff_ms = 50

[power]
policy = "motion_sleep"
settle_ms = 500
sleep_timeout_ms = 30000

[transport]
backend = "mysensors"
node_id = 12

[logging]
rotation = "daily"
"#
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.power.policy, PowerPolicy::MotionSleep);
    assert_eq!(cfg.transport.backend, TransportBackend::MySensors);
    assert_eq!(cfg.transport.node_id, 12);
    assert_eq!(cfg.calibration.samples, 30);
}

#[rstest]
#[case("[sensors.corridor]\nxshut_pin = 27\naddress = 0x30", "must differ")]
#[case("[sensors.corridor]\nxshut_pin = 17\naddress = 0x31", "xshut_pin must differ")]
#[case("[sensors.corridor]\nxshut_pin = 27\naddress = 0x29", "factory address")]
#[case("[sensors.corridor]\nxshut_pin = 27\naddress = 0x31\nthreshold_mm = 9000", "threshold_mm")]
fn rejects_bad_sensor_wiring(#[case] corridor: &str, #[case] needle: &str) {
    let toml = BASE.replace(
        "[sensors.corridor]\nxshut_pin = 27\naddress = 0x31",
        corridor,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "unexpected error: {err}");
}

#[rstest]
#[case("[calibration]\nsamples = 0", "calibration.samples")]
#[case("[calibration]\nmargin_ratio = 1.0", "margin_ratio")]
#[case("[calibration]\nmin_valid_ratio = 0.0", "min_valid_ratio")]
#[case("[calibration]\nenabled = false", "threshold_mm is required")]
#[case("[power]\nsample_rate_hz = 0", "sample_rate_hz must be > 0")]
#[case("[power]\nidle_poll_ms = 0", "idle_poll_ms")]
#[case("[transport]\nbackend = \"mysensors\"\nnode_id = 0", "node_id")]
#[case("[transport]\ntopic = \" \"", "topic must not be empty")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation")]
fn rejects_out_of_range_values(#[case] extra: &str, #[case] needle: &str) {
    let toml = format!("{BASE}\n{extra}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "unexpected error: {err}");
}

#[test]
fn fixed_thresholds_allow_disabling_calibration() {
    let toml = BASE
        .replace("address = 0x30", "address = 0x30\nthreshold_mm = 780")
        .replace("address = 0x31", "address = 0x31\nthreshold_mm = 820");
    let toml = format!("{toml}\n[calibration]\nenabled = false\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("fixed thresholds are enough");
    assert_eq!(cfg.sensors.room.threshold_mm, Some(780));
}

#[test]
fn unknown_policy_is_a_parse_error() {
    let toml = format!("{BASE}\n[power]\npolicy = \"turbo\"\n");
    assert!(load_toml(&toml).is_err());
}
