//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent, within valid ranges, and don't conflict with each other.

use crate::{ConfigError, ConfigResult, PilotConfig, SettleConfig};

/// Button names the emulator understands
const BUTTON_NAMES: &[&str] = &["A", "B", "SELECT", "START", "RIGHT", "LEFT", "UP", "DOWN"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidPortRange { port_name: String, port: u16 },
    PortConflict { port1: String, port2: String, port: u16 },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPortRange { port_name, port } => {
                write!(
                    f,
                    "Port {} = {} is outside valid range (1024-65535)",
                    port_name, port
                )
            }
            Self::PortConflict { port1, port2, port } => {
                write!(
                    f,
                    "Port conflict: {} and {} both use port {}",
                    port1, port2, port
                )
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Port ranges and conflicts
/// - Required fields
/// - Rates, windows and encoder budgets that can actually be honoured
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &PilotConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_ports(config, &mut errors);
    validate_required_fields(config, &mut errors);
    validate_capture_and_clip(config, &mut errors);
    validate_timing(config, &mut errors);
    validate_decision(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_ports(config: &PilotConfig, errors: &mut Vec<ConfigValidationError>) {
    for (port_name, port) in [
        ("ipc.port", config.ipc.port),
        ("emulator.port", config.emulator.port),
    ] {
        if port < 1024 {
            errors.push(ConfigValidationError::InvalidPortRange {
                port_name: port_name.to_string(),
                port,
            });
        }
    }

    if config.ipc.port == config.emulator.port && config.ipc.host == config.emulator.host {
        errors.push(ConfigValidationError::PortConflict {
            port1: "ipc.port".to_string(),
            port2: "emulator.port".to_string(),
            port: config.ipc.port,
        });
    }
}

fn validate_required_fields(config: &PilotConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.ipc.host.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "ipc.host".to_string(),
        });
    }
    if config.emulator.host.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "emulator.host".to_string(),
        });
    }
    if config.game.name.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "game.name".to_string(),
        });
    }
}

fn validate_capture_and_clip(config: &PilotConfig, errors: &mut Vec<ConfigValidationError>) {
    let capture = &config.capture;
    let clip = &config.clip;

    if capture.target_fps <= 0.0 {
        errors.push(invalid("capture.target_fps", "must be positive"));
    }
    if capture.window_secs <= 0.0 {
        errors.push(invalid("capture.window_secs", "must be positive"));
    }
    if clip.max_frames == 0 {
        errors.push(invalid("clip.max_frames", "must be at least 1"));
    }
    if clip.target_width == 0 {
        errors.push(invalid("clip.target_width", "must be at least 1"));
    }
    if clip.min_frame_ms == 0 {
        errors.push(invalid("clip.min_frame_ms", "must be at least 1"));
    }
    // Otherwise a full clip cannot fit inside the playback budget.
    if (clip.max_frames as u64) * (clip.min_frame_ms as u64) > clip.target_total_ms as u64 {
        errors.push(invalid(
            "clip.target_total_ms",
            "must be >= clip.max_frames * clip.min_frame_ms",
        ));
    }
    if clip.default_lookback_secs <= 0.0 || clip.default_lookback_secs > capture.window_secs {
        errors.push(invalid(
            "clip.default_lookback_secs",
            "must be positive and no longer than capture.window_secs",
        ));
    }
    if clip.max_subsequent_secs <= 0.0 || clip.max_subsequent_secs > capture.window_secs {
        errors.push(invalid(
            "clip.max_subsequent_secs",
            "must be positive and no longer than capture.window_secs",
        ));
    }
}

fn validate_timing(config: &PilotConfig, errors: &mut Vec<ConfigValidationError>) {
    let timing = &config.timing;

    if timing.frame_rate <= 0.0 {
        errors.push(invalid("timing.frame_rate", "must be positive"));
    }
    if !(1..=180).contains(&timing.default_hold_frames) {
        errors.push(invalid("timing.default_hold_frames", "must be between 1 and 180"));
    }
    if timing.tick_interval_ms == 0 {
        errors.push(invalid("timing.tick_interval_ms", "must be at least 1"));
    }
    if let SettleConfig::Weighted {
        base_ms,
        max_wait_ms,
        ..
    } = timing.settle
    {
        if base_ms > max_wait_ms {
            errors.push(invalid(
                "timing.settle.base_ms",
                "must not exceed timing.settle.max_wait_ms",
            ));
        }
    }
    if config.ipc.base_timeout_secs <= 0.0 {
        errors.push(invalid("ipc.base_timeout_secs", "must be positive"));
    }
}

fn validate_decision(config: &PilotConfig, errors: &mut Vec<ConfigValidationError>) {
    let decision = &config.decision;

    if decision.oracle_timeout_secs <= 0.0 {
        errors.push(invalid("decision.oracle_timeout_secs", "must be positive"));
    }
    if decision.fallback_buttons.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "decision.fallback_buttons".to_string(),
        });
    }
    for name in &decision.fallback_buttons {
        let known = BUTTON_NAMES
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name.trim()));
        if !known {
            errors.push(invalid(
                "decision.fallback_buttons",
                &format!("unknown button '{}'", name),
            ));
        }
    }
    if config.screenshot.max_polls == 0 {
        errors.push(invalid("screenshot.max_polls", "must be at least 1"));
    }
}

fn invalid(field: &str, reason: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
