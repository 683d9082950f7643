//! Engine configuration validation.
//!
//! Every `[engine]` and `[logging]` key is checked before settings are built,
//! so a typo fails loudly instead of silently falling back to a default.

use crate::domain::error::AlertEngineError;
use crate::ports::config_port::ConfigPort;

pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), AlertEngineError> {
    validate_strict_identifiers(config)?;
    validate_int_at_least(config, "history_capacity", 1)?;
    validate_int_at_least(config, "max_composite_depth", 1)?;
    validate_int_at_least(config, "expression_cache_size", 0)?;
    validate_int_at_least(config, "scheduled_min_interval_secs", 0)?;
    validate_non_negative_number(config, "volume_spike_multiplier")?;
    validate_log_level(config)?;
    Ok(())
}

fn validate_strict_identifiers(config: &dyn ConfigPort) -> Result<(), AlertEngineError> {
    let Some(raw) = config.get_string("engine", "strict_identifiers") else {
        return Ok(());
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "false" | "no" | "0" => Ok(()),
        _ => Err(AlertEngineError::ConfigInvalid {
            section: "engine".to_string(),
            key: "strict_identifiers".to_string(),
            reason: format!("expected a boolean, got '{}'", raw),
        }),
    }
}

fn validate_int_at_least(
    config: &dyn ConfigPort,
    key: &str,
    min: i64,
) -> Result<(), AlertEngineError> {
    let Some(raw) = config.get_string("engine", key) else {
        return Ok(());
    };
    let invalid = |reason: String| AlertEngineError::ConfigInvalid {
        section: "engine".to_string(),
        key: key.to_string(),
        reason,
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("expected an integer, got '{}'", raw)))?;
    if value < min {
        return Err(invalid(format!("{} must be at least {}", key, min)));
    }
    Ok(())
}

fn validate_non_negative_number(config: &dyn ConfigPort, key: &str) -> Result<(), AlertEngineError> {
    let Some(raw) = config.get_string("engine", key) else {
        return Ok(());
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(()),
        _ => Err(AlertEngineError::ConfigInvalid {
            section: "engine".to_string(),
            key: key.to_string(),
            reason: format!("expected a non-negative number, got '{}'", raw),
        }),
    }
}

fn validate_log_level(config: &dyn ConfigPort) -> Result<(), AlertEngineError> {
    match config.get_string("logging", "level") {
        None => Ok(()),
        Some(level) if LOG_LEVELS.contains(&level.trim().to_lowercase().as_str()) => Ok(()),
        Some(level) => Err(AlertEngineError::ConfigInvalid {
            section: "logging".to_string(),
            key: "level".to_string(),
            reason: format!("unknown log level '{}'", level),
        }),
    }
}
