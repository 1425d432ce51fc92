//! Human-readable error descriptions and structured JSON error formatting.

use roode_core::error::{BuildError, RoodeError};

/// Exit code for a sensor that failed to initialize.
pub const EXIT_SENSOR_INIT: i32 = 3;
/// Exit code for a calibration that could not gather enough valid samples.
pub const EXIT_CALIBRATION: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingRoomSensor | BuildError::MissingCorridorSensor => {
                "What happened: A range sensor was not provided to the gate engine.\nLikely causes: Sensor construction failed or was not wired into the builder.\nHow to fix: Ensure both sensors are created and passed via with_sensors(...).".to_string()
            }
            BuildError::MissingMotion => {
                "What happened: No motion input was provided to the gate engine.\nLikely causes: PIR pin could not be claimed.\nHow to fix: Check [motion].pin in the config and GPIO permissions.".to_string()
            }
            BuildError::MissingTransmitter => {
                "What happened: No transmitter was provided to the gate engine.\nLikely causes: Transport backend was not configured.\nHow to fix: Set [transport].backend to \"mqtt\" or \"mysensors\".".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/roode.toml for a sample."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RoodeError>() {
        return match re {
            RoodeError::SensorInit { role, reason } => format!(
                "What happened: The {role} range sensor did not initialize ({reason}).\nLikely causes: Wrong XSHUT pin, loose I2C wiring, or two sensors configured with the same address.\nHow to fix: Check [sensors.{role}] in the config and the sensor wiring, then restart."
            ),
            RoodeError::CalibrationFailed {
                role,
                valid,
                taken,
                required,
            } => format!(
                "What happened: Calibration of the {role} sensor failed: only {valid} of {taken} samples were usable ({required} needed).\nLikely causes: Something standing in the doorway, or the sensor sees nothing within range.\nHow to fix: Clear the doorway and retry, or lower calibration.min_valid_ratio."
            ),
            RoodeError::InsufficientSamples {
                valid,
                taken,
                required,
            } => format!(
                "What happened: Not enough usable ambient samples: {valid} of {taken} ({required} needed).\nLikely causes: Empty cells or out-of-range distances in the samples file.\nHow to fix: Record the empty doorway again, or lower calibration.min_valid_ratio."
            ),
            RoodeError::SensorTimeout(role) => format!(
                "What happened: The {role} sensor stopped answering.\nLikely causes: Bus noise or a brown-out.\nHow to fix: Check power and wiring; the counter recalibrates on its own when the sensor recovers."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init, config or CSV files
    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("csv must have headers") {
        return format!("Invalid headers in CSV file. {msg}");
    }

    if lower.starts_with("read config") || lower.starts_with("parse config") {
        return format!(
            "What happened: The configuration file could not be loaded. Cause: {msg}\nHow to fix: Check the --config path and the TOML syntax."
        );
    }

    if lower.contains("must differ")
        || lower.contains("must be")
        || lower.contains("is required")
        || lower.contains("invalid configuration")
    {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("open doorway hardware") {
        return "What happened: Failed to claim the sensor bus or GPIO pins.\nLikely causes: I2C disabled, wrong bus number, or insufficient GPIO permissions.\nHow to fix: Enable I2C, check [hardware].i2c_bus and the pin numbers, and run with GPIO access.".to_string();
    }

    // Generic fallback
    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 sensor init, 4 calibration, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<RoodeError>() {
        Some(RoodeError::SensorInit { .. }) => EXIT_SENSOR_INIT,
        Some(RoodeError::CalibrationFailed { .. } | RoodeError::InsufficientSamples { .. }) => {
            EXIT_CALIBRATION
        }
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    match err.downcast_ref::<RoodeError>() {
        Some(RoodeError::SensorInit { .. }) => "SensorInit",
        Some(RoodeError::CalibrationFailed { .. }) => "CalibrationFailed",
        Some(RoodeError::InsufficientSamples { .. }) => "InsufficientSamples",
        Some(RoodeError::SensorTimeout(_)) => "SensorTimeout",
        Some(RoodeError::Timeout) => "Timeout",
        Some(RoodeError::Hardware(_) | RoodeError::HardwareFault(_)) => "Hardware",
        Some(RoodeError::Config(_)) => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(re) = err.downcast_ref::<RoodeError>() {
        let details = match re {
            RoodeError::SensorInit { role, .. } | RoodeError::SensorTimeout(role) => {
                Some(json!({ "role": role.to_string() }))
            }
            RoodeError::CalibrationFailed {
                role,
                valid,
                taken,
                required,
            } => Some(json!({
                "role": role.to_string(),
                "valid": valid,
                "taken": taken,
                "required": required,
            })),
            RoodeError::InsufficientSamples {
                valid,
                taken,
                required,
            } => Some(json!({ "valid": valid, "taken": taken, "required": required })),
            _ => None,
        };
        if let Some(d) = details {
            obj["details"] = d;
        }
    }
    obj.to_string()
}
