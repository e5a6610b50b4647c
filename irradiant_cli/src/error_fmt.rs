//! Human-readable error descriptions and structured JSON error formatting.

use irradiant_core::error::{BuildError, PrintError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStage => {
                "What happened: No stage was provided to the job executor.\nLikely causes: The motion backend failed to open or was not wired into the builder.\nHow to fix: Check [stage] in the config and the backend's connection.".to_string()
            }
            BuildError::MissingLimits => {
                "What happened: The configured axis has no position limits.\nLikely causes: [stage].axis names an axis without a [limits.<AXIS>] table.\nHow to fix: Add min_nm/max_nm for that axis to the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/irradiant.toml for a sample."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<PrintError>() {
        return match pe {
            PrintError::Busy => "What happened: Another movement is in progress.\nLikely causes: A job, jog or manual move holds the movement lock.\nHow to fix: Wait for it to finish (or stop it) and try again.".to_string(),
            PrintError::OutOfRange { axis, target_nm, min_nm, max_nm } => format!(
                "What happened: A {axis} target of {target_nm} nm is outside the allowed range [{min_nm}, {max_nm}] nm.\nLikely causes: Too many layers or too large a z step for the current start position.\nHow to fix: Move the axis closer to the centre of its range, reduce the z step, or widen [limits.{axis}]."
            ),
            PrintError::Timeout(msg) => format!(
                "What happened: A device did not finish in time ({msg}).\nLikely causes: Output device not clocking, sample rate mismatch, or a timeout multiplier that is too tight.\nHow to fix: Check the device connection and consider raising daq.timeout_multiplier."
            ),
            PrintError::Validation(msg) => format!(
                "What happened: The request was rejected before touching hardware ({msg}).\nLikely causes: Out-of-range job parameters, a malformed dose matrix, or an invalid config value.\nHow to fix: Correct the value named above and rerun."
            ),
            PrintError::Device(msg) | PrintError::DeviceFault(msg) => format!(
                "What happened: Device error ({msg}).\nLikely causes: Cable unplugged, device powered off, or the vendor backend is not available in this build.\nHow to fix: Check connections and [stage].backend; set fallback_to_simulated = true to test without hardware."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("lut csv must have headers") {
        return "Invalid headers in LUT CSV. Expected 'power,voltage'.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: The configuration file could not be loaded.\nLikely causes: Wrong --config path or a TOML syntax error.\nHow to fix: Check the path and the file contents. Details: {err:#}"
        );
    }

    if lower.contains("dose matrix") {
        return format!(
            "What happened: The dose matrix could not be loaded.\nLikely causes: Missing file, invalid JSON, or data length not matching shape.\nHow to fix: Provide {{\"shape\": [rows, cols, layers], \"data\": [...]}} with rows*cols*layers values. Details: {err:#}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for typed errors; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 5;
    }
    match err.downcast_ref::<PrintError>() {
        Some(PrintError::Busy) => 3,
        Some(PrintError::Timeout(_)) => 4,
        Some(PrintError::Validation(_) | PrintError::OutOfRange { .. }) => 5,
        Some(PrintError::Device(_) | PrintError::DeviceFault(_)) => 6,
        _ => 1,
    }
}

/// Short stable name of the error kind for JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    match err.downcast_ref::<PrintError>() {
        Some(PrintError::Validation(_)) => "Validation",
        Some(PrintError::OutOfRange { .. }) => "OutOfRange",
        Some(PrintError::Device(_)) => "Device",
        Some(PrintError::DeviceFault(_)) => "DeviceFault",
        Some(PrintError::Timeout(_)) => "Timeout",
        Some(PrintError::Busy) => "Busy",
        Some(PrintError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    if let Some(PrintError::OutOfRange {
        axis,
        target_nm,
        min_nm,
        max_nm,
    }) = err.downcast_ref::<PrintError>()
    {
        return json!({
            "reason": "OutOfRange",
            "details": { "axis": axis, "target_nm": target_nm, "min_nm": min_nm, "max_nm": max_nm },
            "message": msg,
        })
        .to_string();
    }

    json!({ "reason": reason_name(err), "message": msg }).to_string()
}
