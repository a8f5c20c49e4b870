//! Human-readable error descriptions and structured JSON error formatting.

use rcdrive_core::error::{BuildError, DriveError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingDrive => {
                "What happened: No drive output was provided to the motor.\nLikely causes: The PWM bridge or simulated plant failed to initialize.\nHow to fix: Ensure the drive is created successfully and passed via with_drive(...).".to_string()
            }
            BuildError::MissingEncoder => {
                "What happened: No encoder counter was provided to the motor.\nLikely causes: Encoder inputs were not wired into the builder.\nHow to fix: Pass the shared counter via with_encoder(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid motor configuration ({msg}).\nLikely causes: Out-of-range values in the TOML or a degenerate motor model.\nHow to fix: Edit the config file or refit the motor model, then rerun."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DriveError>() {
        return match de {
            DriveError::Timeout => "What happened: Hardware did not answer in time.\nLikely causes: Sensor or bridge not powered, or wiring fault.\nHow to fix: Check power and wiring; consider raising aeb.read_timeout_ms.".to_string(),
            DriveError::HardwareFault(m) | DriveError::Hardware(m) => format!(
                "What happened: The drive output failed ({m}).\nLikely causes: Motor driver disconnected, PWM channel unavailable, or insufficient permissions.\nHow to fix: Check the [pins] section and the bridge wiring; on a Pi make sure PWM is enabled in the device tree."
            ),
            other if other.is_rejected_input() => format!(
                "What happened: {other}.\nLikely causes: A command-line value is out of range.\nHow to fix: See `rcdrive drive --help` for accepted ranges."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid.\nLikely causes: TOML syntax error, unknown value, or a missing [pins] section.\nHow to fix: {}",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    // Motor-model CSV header special-case
    if lower.contains("must have headers") {
        return "Invalid headers in motor model CSV. Expected 'duty_percent,rps'.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong path or missing permissions.\nHow to fix: Pass --config <FILE>. Original: {msg}"
        );
    }

    if lower.contains("must be") || lower.contains("must have") || lower.contains("must differ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file and try again."
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

/// Stable exit codes: 3 hardware, 4 timeout, 5 motor build, 6 rejected input, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 5;
    }
    match err.downcast_ref::<DriveError>() {
        Some(DriveError::Hardware(_) | DriveError::HardwareFault(_)) => 3,
        Some(DriveError::Timeout) => 4,
        Some(e) if e.is_rejected_input() => 6,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<DriveError>() {
        Some(DriveError::Hardware(_) | DriveError::HardwareFault(_)) => "Hardware",
        Some(DriveError::Timeout) => "Timeout",
        Some(e) if e.is_rejected_input() => "RejectedInput",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_errors_survive_context() {
        let e = eyre::Report::new(DriveError::HardwareFault("bridge gone".into()))
            .wrap_err("writing drive duty");
        assert_eq!(exit_code_for_error(&e), 3);
        assert!(humanize(&e).contains("bridge gone"));
    }

    #[test]
    fn build_errors_have_their_own_code() {
        let e = eyre::Report::new(BuildError::InvalidConfig("ramp rates must be > 0"));
        assert_eq!(exit_code_for_error(&e), 5);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Build");
        assert!(v["message"].as_str().unwrap().contains("ramp rates"));
    }

    #[test]
    fn csv_header_hint() {
        let e = eyre::eyre!("motor model CSV must have headers 'duty_percent,rps'");
        assert_eq!(
            humanize(&e),
            "Invalid headers in motor model CSV. Expected 'duty_percent,rps'."
        );
        assert_eq!(exit_code_for_error(&e), 1);
    }

    #[test]
    fn rejected_input() {
        let e = eyre::Report::new(DriveError::InvalidSpeedPercent(150.0));
        assert_eq!(exit_code_for_error(&e), 6);
        assert!(humanize(&e).contains("-100..=100"));
    }
}
