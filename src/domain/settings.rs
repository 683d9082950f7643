//! Engine settings read from the `[engine]` and `[logging]` sections.

use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::AlertEngineError;
use crate::domain::evaluator::{Evaluator, EvaluatorOptions};
use crate::domain::trigger_factory::{
    TriggerFactory, DEFAULT_MAX_COMPOSITE_DEPTH, DEFAULT_SCHEDULED_MIN_INTERVAL_SECS,
    DEFAULT_VOLUME_MULTIPLIER,
};
use crate::domain::trigger_manager::{TriggerManager, DEFAULT_HISTORY_CAPACITY};
use crate::ports::config_port::ConfigPort;
use chrono::TimeDelta;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub strict_identifiers: bool,
    pub history_capacity: usize,
    pub max_composite_depth: usize,
    pub expression_cache_size: usize,
    pub scheduled_min_interval_secs: i64,
    pub volume_spike_multiplier: f64,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strict_identifiers: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_composite_depth: DEFAULT_MAX_COMPOSITE_DEPTH,
            expression_cache_size: EvaluatorOptions::default().cache_size,
            scheduled_min_interval_secs: DEFAULT_SCHEDULED_MIN_INTERVAL_SECS,
            volume_spike_multiplier: DEFAULT_VOLUME_MULTIPLIER,
            log_level: "info".to_string(),
        }
    }
}

impl EngineSettings {
    /// Validate and read settings. Missing keys take their defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlertEngineError> {
        validate_engine_config(config)?;
        let defaults = Self::default();
        Ok(Self {
            strict_identifiers: config.get_bool(
                "engine",
                "strict_identifiers",
                defaults.strict_identifiers,
            ),
            history_capacity: read_count(config, "history_capacity", defaults.history_capacity),
            max_composite_depth: read_count(
                config,
                "max_composite_depth",
                defaults.max_composite_depth,
            ),
            expression_cache_size: read_count(
                config,
                "expression_cache_size",
                defaults.expression_cache_size,
            ),
            scheduled_min_interval_secs: config.get_int(
                "engine",
                "scheduled_min_interval_secs",
                defaults.scheduled_min_interval_secs,
            ),
            volume_spike_multiplier: config.get_double(
                "engine",
                "volume_spike_multiplier",
                defaults.volume_spike_multiplier,
            ),
            log_level: config
                .get_string("logging", "level")
                .map(|level| level.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
        })
    }

    pub fn evaluator_options(&self) -> EvaluatorOptions {
        EvaluatorOptions {
            strict_identifiers: self.strict_identifiers,
            cache_size: self.expression_cache_size,
        }
    }

    pub fn evaluator(&self) -> Arc<Evaluator> {
        Arc::new(Evaluator::new(self.evaluator_options()))
    }

    pub fn trigger_factory(&self) -> TriggerFactory {
        TriggerFactory::new(self.evaluator())
            .with_max_depth(self.max_composite_depth)
            .with_scheduled_min_interval(
                TimeDelta::try_seconds(self.scheduled_min_interval_secs)
                    .unwrap_or(TimeDelta::seconds(DEFAULT_SCHEDULED_MIN_INTERVAL_SECS)),
            )
            .with_volume_multiplier(self.volume_spike_multiplier)
    }

    pub fn trigger_manager(&self) -> TriggerManager {
        TriggerManager::new(self.trigger_factory()).with_history_capacity(self.history_capacity)
    }
}

fn read_count(config: &dyn ConfigPort, key: &str, default: usize) -> usize {
    let value = config.get_int("engine", key, default as i64);
    usize::try_from(value).unwrap_or(default)
}
