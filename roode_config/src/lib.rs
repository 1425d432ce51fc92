#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and CSV inputs for the doorway people counter.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Ambient-sample CSVs feed offline calibration.
//! - Replay CSVs script the simulated doorway for the `run` command.
use serde::Deserialize;

/// Factory bus address of the range sensors; never a valid target address.
pub const FACTORY_ADDRESS: u8 = 0x29;

#[derive(Debug, Deserialize, Clone)]
pub struct SensorPins {
    /// GPIO driving the sensor's XSHUT (enable/reset) line
    pub xshut_pin: u8,
    /// Bus address assigned during initialization
    pub address: u8,
    /// Presence threshold used until (or instead of) calibration, in mm
    #[serde(default)]
    pub threshold_mm: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct Sensors {
    pub room: SensorPins,
    pub corridor: SensorPins,
    /// Readings at or above this value mean "no return"
    #[serde(default = "default_max_range_mm")]
    pub max_range_mm: u16,
    /// Upper bound on a single acquisition (ms)
    #[serde(default = "default_acquisition_timeout_ms")]
    pub acquisition_timeout_ms: u64,
    /// Consecutive misses before a sensor is flagged as timed out
    #[serde(default = "default_miss_limit")]
    pub miss_limit: u8,
}

fn default_max_range_mm() -> u16 {
    8190
}

fn default_acquisition_timeout_ms() -> u64 {
    50
}

fn default_miss_limit() -> u8 {
    3
}

#[derive(Debug, Deserialize)]
pub struct Motion {
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_high: bool,
    /// PIR warm-up before the first calibration (ms)
    #[serde(default)]
    pub warmup_ms: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Calibrate both sensors at startup
    pub enabled: bool,
    /// Readings per calibration run
    pub samples: usize,
    /// Safety margin as a fraction of the ambient mean
    pub margin_ratio: f32,
    /// Minimum fraction of valid readings for a run to count
    pub min_valid_ratio: f32,
    /// Extra attempts after a failed run
    pub retries: u8,
    /// Linear backoff step between attempts (ms)
    pub retry_backoff_ms: u64,
    /// Delay between readings within a run (ms)
    pub sample_interval_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 20,
            margin_ratio: 0.10,
            min_valid_ratio: 0.5,
            retries: 2,
            retry_backoff_ms: 100,
            sample_interval_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerPolicy {
    /// Sensors stay continuous; the gate is stepped every tick
    AlwaysOn,
    /// Sensors idle until the PIR fires
    #[default]
    MotionGated,
    /// Like `motion_gated`, but block on the PIR interrupt while idle
    MotionSleep,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Power {
    pub policy: PowerPolicy,
    /// Motion must stay low this long before sensors go idle (ms)
    pub settle_ms: u64,
    /// Idle-state polling interval for the PIR (ms)
    pub idle_poll_ms: u64,
    /// Longest single sleep in `motion_sleep` (ms)
    pub sleep_timeout_ms: u64,
    /// Gate steps per second while awake
    pub sample_rate_hz: u32,
}

impl Default for Power {
    fn default() -> Self {
        Self {
            policy: PowerPolicy::MotionGated,
            settle_ms: 2_000,
            idle_poll_ms: 100,
            sleep_timeout_ms: 60_000,
            sample_rate_hz: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// Domoticz JSON over MQTT
    #[default]
    Mqtt,
    /// MySensors serial gateway
    MySensors,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DomoticzIdx {
    pub room_switch: u32,
    pub people_counter: u32,
    pub threshold: u32,
}

impl Default for DomoticzIdx {
    fn default() -> Self {
        Self {
            room_switch: 1,
            people_counter: 2,
            threshold: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Transport {
    pub backend: TransportBackend,
    /// MQTT topic the controller listens on
    pub topic: String,
    /// MySensors node id
    pub node_id: u8,
    pub idx: DomoticzIdx,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            backend: TransportBackend::Mqtt,
            topic: "domoticz/in".to_string(),
            node_id: 1,
            idx: DomoticzIdx::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// I²C bus number shared by both range sensors
    pub i2c_bus: u8,
}

impl Default for Hardware {
    fn default() -> Self {
        Self { i2c_bus: 1 }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub sensors: Sensors,
    pub motion: Motion,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub power: Power,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensors
        let (room, corridor) = (&self.sensors.room, &self.sensors.corridor);
        for (name, s) in [("room", room), ("corridor", corridor)] {
            if !(0x08..=0x77).contains(&s.address) {
                eyre::bail!("sensors.{name}.address must be a 7-bit address in 0x08..=0x77");
            }
            if s.address == FACTORY_ADDRESS {
                eyre::bail!("sensors.{name}.address must differ from the factory address 0x29");
            }
            if let Some(t) = s.threshold_mm {
                if t == 0 || t >= self.sensors.max_range_mm {
                    eyre::bail!("sensors.{name}.threshold_mm must be in 1..max_range_mm");
                }
            }
        }
        if room.address == corridor.address {
            eyre::bail!("sensors.room.address and sensors.corridor.address must differ");
        }
        if room.xshut_pin == corridor.xshut_pin {
            eyre::bail!("sensors.room.xshut_pin and sensors.corridor.xshut_pin must differ");
        }
        if self.sensors.max_range_mm == 0 {
            eyre::bail!("sensors.max_range_mm must be > 0");
        }
        if self.sensors.acquisition_timeout_ms == 0 {
            eyre::bail!("sensors.acquisition_timeout_ms must be >= 1");
        }
        if self.sensors.miss_limit == 0 {
            eyre::bail!("sensors.miss_limit must be >= 1");
        }

        // Without calibration there is nothing to derive a threshold from
        if !self.calibration.enabled && (room.threshold_mm.is_none() || corridor.threshold_mm.is_none())
        {
            eyre::bail!(
                "sensors.*.threshold_mm is required for both sensors when calibration.enabled = false"
            );
        }

        // Calibration
        if self.calibration.samples == 0 {
            eyre::bail!("calibration.samples must be >= 1");
        }
        if !(self.calibration.margin_ratio >= 0.0 && self.calibration.margin_ratio < 1.0) {
            eyre::bail!("calibration.margin_ratio must be in [0.0, 1.0)");
        }
        if !(self.calibration.min_valid_ratio > 0.0 && self.calibration.min_valid_ratio <= 1.0) {
            eyre::bail!("calibration.min_valid_ratio must be in (0.0, 1.0]");
        }
        if self.calibration.retry_backoff_ms > 60_000 {
            eyre::bail!("calibration.retry_backoff_ms is unreasonably large (>1min)");
        }

        // Power
        if self.power.sample_rate_hz == 0 {
            eyre::bail!("power.sample_rate_hz must be > 0");
        }
        if self.power.sample_rate_hz > 1_000 {
            eyre::bail!("power.sample_rate_hz must be <= 1000");
        }
        if self.power.idle_poll_ms == 0 {
            eyre::bail!("power.idle_poll_ms must be >= 1");
        }
        if self.power.settle_ms > 60 * 60 * 1000 {
            eyre::bail!("power.settle_ms is unreasonably large (>1h)");
        }
        if self.power.policy == PowerPolicy::MotionSleep && self.power.sleep_timeout_ms == 0 {
            eyre::bail!("power.sleep_timeout_ms must be >= 1 with policy = \"motion_sleep\"");
        }

        // Transport
        if self.transport.backend == TransportBackend::Mqtt && self.transport.topic.trim().is_empty()
        {
            eyre::bail!("transport.topic must not be empty for the mqtt backend");
        }
        if self.transport.backend == TransportBackend::MySensors
            && !(1..=254).contains(&self.transport.node_id)
        {
            eyre::bail!("transport.node_id must be in 1..=254");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref() {
            if !matches!(r, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly");
            }
        }

        Ok(())
    }
}

/// Ambient-sample CSV schema for offline calibration.
///
/// Expected header: `distance_mm`. Empty cells are missed acquisitions.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AmbientRow {
    pub distance_mm: Option<u16>,
}

/// One replay step for the simulated doorway.
///
/// Expected headers: `room_mm,corridor_mm,motion`. Empty distance cells are
/// missed acquisitions; `motion` is 0/1 or true/false.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ReplayRow {
    pub room_mm: Option<u16>,
    pub corridor_mm: Option<u16>,
    #[serde(deserialize_with = "de_flag")]
    pub motion: bool,
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "high" | "on" => Ok(true),
        "0" | "false" | "low" | "off" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid motion flag '{other}'"
        ))),
    }
}

fn read_csv<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
    expected: &[&str],
    kind: &str,
) -> eyre::Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open {kind} CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "{kind} CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<T>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid {kind} CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

pub fn load_ambient_csv(path: &std::path::Path) -> eyre::Result<Vec<Option<u16>>> {
    let rows: Vec<AmbientRow> = read_csv(path, &["distance_mm"], "ambient")?;
    if rows.is_empty() {
        eyre::bail!("ambient CSV {:?} has no samples", path);
    }
    Ok(rows.into_iter().map(|r| r.distance_mm).collect())
}

pub fn load_replay_csv(path: &std::path::Path) -> eyre::Result<Vec<ReplayRow>> {
    read_csv(path, &["room_mm", "corridor_mm", "motion"], "replay")
}
