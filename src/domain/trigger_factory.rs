//! Builds triggers from declarative configuration.
//!
//! All validation happens here so that a bad configuration fails when the
//! alert is created instead of silently never firing.

use crate::domain::error::ConfigError;
use crate::domain::evaluator::Evaluator;
use crate::domain::trigger::{
    parse_time, BandEdge, Combinator, CrossDirection, Schedule, Trigger, TriggerConfig,
    TriggerKind, TriggerType,
};
use chrono::{TimeDelta, Weekday};
use serde::Serialize;
use serde_json::{Map, Value as Json, json};
use std::sync::Arc;

pub const DEFAULT_MAX_COMPOSITE_DEPTH: usize = 8;
pub const DEFAULT_SCHEDULED_MIN_INTERVAL_SECS: i64 = 300;
pub const DEFAULT_VOLUME_MULTIPLIER: f64 = 3.0;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone)]
pub struct TriggerFactory {
    evaluator: Arc<Evaluator>,
    max_depth: usize,
    scheduled_min_interval: TimeDelta,
    volume_multiplier: f64,
}

impl TriggerFactory {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self {
            evaluator,
            max_depth: DEFAULT_MAX_COMPOSITE_DEPTH,
            scheduled_min_interval: TimeDelta::seconds(DEFAULT_SCHEDULED_MIN_INTERVAL_SECS),
            volume_multiplier: DEFAULT_VOLUME_MULTIPLIER,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_scheduled_min_interval(mut self, interval: TimeDelta) -> Self {
        self.scheduled_min_interval = interval;
        self
    }

    /// Multiplier used by `volume_spike` configs that omit one.
    pub fn with_volume_multiplier(mut self, multiplier: f64) -> Self {
        self.volume_multiplier = multiplier;
        self
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    pub fn create(&self, config: &TriggerConfig) -> Result<Trigger, ConfigError> {
        self.build(config, 0)
    }

    fn build(&self, config: &TriggerConfig, composite_depth: usize) -> Result<Trigger, ConfigError> {
        let trigger_type: TriggerType =
            config
                .trigger_type
                .parse()
                .map_err(|trigger_type| ConfigError::UnknownTriggerType { trigger_type })?;
        let p = Params {
            trigger_type,
            params: &config.params,
        };

        let kind = match trigger_type {
            TriggerType::PriceAbove => TriggerKind::PriceAbove {
                threshold: p.required_number("threshold")?,
            },
            TriggerType::PriceBelow => TriggerKind::PriceBelow {
                threshold: p.required_number("threshold")?,
            },
            TriggerType::VolumeSpike => {
                let multiplier = p.optional_number("multiplier", self.volume_multiplier)?;
                if multiplier < 0.0 {
                    return Err(p.invalid("multiplier", "must not be negative"));
                }
                TriggerKind::VolumeSpike {
                    multiplier,
                    lookback: p.optional_count("lookback_period", 20)? as usize,
                }
            }
            TriggerType::RsiOverbought | TriggerType::RsiOversold => TriggerKind::Rsi {
                threshold: p.required_number("threshold")?,
                overbought: trigger_type == TriggerType::RsiOverbought,
            },
            TriggerType::BollingerBreakout => {
                let edge = match p.optional_str("direction", "upper")? {
                    "upper" => BandEdge::Upper,
                    "lower" => BandEdge::Lower,
                    _ => return Err(p.invalid("direction", "expected 'upper' or 'lower'")),
                };
                TriggerKind::BollingerBreakout {
                    edge,
                    confirmation_period: p.optional_count("confirmation_period", 2)?,
                    confirmation_count: 0,
                }
            }
            TriggerType::MacdCrossover => {
                let direction = match p.optional_str("crossover_type", "bullish")? {
                    "bullish" => CrossDirection::Bullish,
                    "bearish" => CrossDirection::Bearish,
                    _ => {
                        return Err(p.invalid("crossover_type", "expected 'bullish' or 'bearish'"));
                    }
                };
                TriggerKind::MacdCrossover {
                    direction,
                    previous: None,
                }
            }
            TriggerType::ScheduledTime => {
                let min_interval = match p.params.get("min_interval_secs") {
                    None => self.scheduled_min_interval,
                    Some(value) => {
                        TimeDelta::seconds(i64::from(p.integer_value("min_interval_secs", value)?))
                    }
                };
                TriggerKind::Scheduled {
                    schedule: p.schedule()?,
                    min_interval,
                }
            }
            TriggerType::CustomDsl => {
                let expression = p.required_str("dsl_expression")?.to_string();
                let tree = self.evaluator.compile(&expression)?;
                TriggerKind::Custom {
                    expression,
                    tree,
                    evaluator: Arc::clone(&self.evaluator),
                }
            }
            TriggerType::CompositeTrigger => {
                let depth = composite_depth + 1;
                if depth > self.max_depth {
                    return Err(ConfigError::TooDeep {
                        max_depth: self.max_depth,
                    });
                }
                let operator = p
                    .optional_str("operator", "AND")?
                    .parse::<Combinator>()
                    .map_err(|reason| p.invalid("operator", &reason))?;
                let configs = p.required("triggers")?.as_array().ok_or_else(|| {
                    p.invalid("triggers", "expected a list of trigger configurations")
                })?;
                if configs.is_empty() {
                    return Err(p.invalid("triggers", "must contain at least one trigger"));
                }
                let children = configs
                    .iter()
                    .map(|child| {
                        let child: TriggerConfig = serde_json::from_value(child.clone())
                            .map_err(|e| p.invalid("triggers", &e.to_string()))?;
                        self.build(&child, depth)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                TriggerKind::Composite { operator, children }
            }
        };
        Ok(Trigger::new(kind))
    }

    pub fn supported_trigger_types(&self) -> Vec<TriggerTypeInfo> {
        TriggerType::ALL.iter().map(|t| describe(*t)).collect()
    }
}

/// Parameter lookups for one trigger configuration.
struct Params<'a> {
    trigger_type: TriggerType,
    params: &'a Map<String, Json>,
}

impl<'a> Params<'a> {
    fn invalid(&self, param: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidParam {
            trigger_type: self.trigger_type.to_string(),
            param: param.to_string(),
            reason: reason.to_string(),
        }
    }

    fn required(&self, param: &str) -> Result<&'a Json, ConfigError> {
        match self.params.get(param) {
            None | Some(Json::Null) => Err(ConfigError::MissingParam {
                trigger_type: self.trigger_type.to_string(),
                param: param.to_string(),
            }),
            Some(value) => Ok(value),
        }
    }

    fn number_value(&self, param: &str, value: &Json) -> Result<f64, ConfigError> {
        value
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| self.invalid(param, "expected a number"))
    }

    fn required_number(&self, param: &str) -> Result<f64, ConfigError> {
        let value = self.required(param)?;
        self.number_value(param, value)
    }

    fn optional_number(&self, param: &str, default: f64) -> Result<f64, ConfigError> {
        match self.params.get(param) {
            None | Some(Json::Null) => Ok(default),
            Some(value) => self.number_value(param, value),
        }
    }

    fn integer_value(&self, param: &str, value: &Json) -> Result<u32, ConfigError> {
        let n = self.number_value(param, value)?;
        if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
            return Err(self.invalid(param, "expected a non-negative integer"));
        }
        Ok(n as u32)
    }

    /// A positive integer parameter.
    fn optional_count(&self, param: &str, default: u32) -> Result<u32, ConfigError> {
        let n = match self.params.get(param) {
            None | Some(Json::Null) => return Ok(default),
            Some(value) => self.integer_value(param, value)?,
        };
        if n == 0 {
            return Err(self.invalid(param, "must be at least 1"));
        }
        Ok(n)
    }

    fn required_str(&self, param: &str) -> Result<&'a str, ConfigError> {
        self.required(param)?
            .as_str()
            .ok_or_else(|| self.invalid(param, "expected a string"))
    }

    fn optional_str(&self, param: &str, default: &'a str) -> Result<&'a str, ConfigError> {
        match self.params.get(param) {
            None | Some(Json::Null) => Ok(default),
            Some(value) => value
                .as_str()
                .ok_or_else(|| self.invalid(param, "expected a string")),
        }
    }

    fn time_value(&self, value: &Json) -> Result<chrono::NaiveTime, ConfigError> {
        value
            .as_str()
            .and_then(parse_time)
            .ok_or_else(|| self.invalid("value", "expected a time formatted HH:MM"))
    }

    fn schedule(&self) -> Result<Schedule, ConfigError> {
        let value = self.required("value")?;
        match self.required_str("condition")? {
            "specific_time" => Ok(Schedule::SpecificTime(self.time_value(value)?)),
            "time_window" => match value.as_array().map(Vec::as_slice) {
                Some([start, end]) => Ok(Schedule::TimeWindow(
                    self.time_value(start)?,
                    self.time_value(end)?,
                )),
                _ => Err(self.invalid("value", "expected [start, end] times")),
            },
            "day_of_week" => {
                let day = self.integer_value("value", value)?;
                WEEKDAYS
                    .get(day as usize)
                    .map(|d| Schedule::DayOfWeek(*d))
                    .ok_or_else(|| self.invalid("value", "expected a weekday from 0 (Monday) to 6"))
            }
            _ => Err(self.invalid(
                "condition",
                "expected 'specific_time', 'time_window' or 'day_of_week'",
            )),
        }
    }
}

/// One parameter of a trigger type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerTypeInfo {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub name: String,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

fn param(
    name: &'static str,
    kind: &'static str,
    default: Option<Json>,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: default.is_none(),
        default,
        description,
    }
}

fn describe(trigger_type: TriggerType) -> TriggerTypeInfo {
    let (description, params) = match trigger_type {
        TriggerType::PriceAbove => (
            "Trigger when price goes above threshold",
            vec![param("threshold", "number", None, "Price threshold")],
        ),
        TriggerType::PriceBelow => (
            "Trigger when price goes below threshold",
            vec![param("threshold", "number", None, "Price threshold")],
        ),
        TriggerType::VolumeSpike => (
            "Trigger when volume spikes above average",
            vec![
                param(
                    "multiplier",
                    "number",
                    Some(json!(DEFAULT_VOLUME_MULTIPLIER)),
                    "Volume multiplier",
                ),
                param(
                    "lookback_period",
                    "integer",
                    Some(json!(20)),
                    "Lookback period for average",
                ),
            ],
        ),
        TriggerType::RsiOverbought => (
            "Trigger when RSI enters overbought territory",
            vec![param("threshold", "number", None, "RSI threshold, typically 70")],
        ),
        TriggerType::RsiOversold => (
            "Trigger when RSI enters oversold territory",
            vec![param("threshold", "number", None, "RSI threshold, typically 30")],
        ),
        TriggerType::BollingerBreakout => (
            "Trigger when price breaks Bollinger Bands",
            vec![
                param("direction", "string", Some(json!("upper")), "Band edge: upper or lower"),
                param(
                    "confirmation_period",
                    "integer",
                    Some(json!(2)),
                    "Consecutive ticks beyond the band before firing",
                ),
            ],
        ),
        TriggerType::MacdCrossover => (
            "Trigger on MACD line crossing its signal line",
            vec![param(
                "crossover_type",
                "string",
                Some(json!("bullish")),
                "bullish or bearish",
            )],
        ),
        TriggerType::ScheduledTime => (
            "Trigger at a time of day, within a time window or on a weekday",
            vec![
                param(
                    "condition",
                    "string",
                    None,
                    "specific_time, time_window or day_of_week",
                ),
                param(
                    "value",
                    "any",
                    None,
                    "HH:MM, [HH:MM, HH:MM] or weekday 0 (Monday) to 6",
                ),
                param(
                    "min_interval_secs",
                    "integer",
                    Some(json!(DEFAULT_SCHEDULED_MIN_INTERVAL_SECS)),
                    "Minimum seconds between fires",
                ),
            ],
        ),
        TriggerType::CustomDsl => (
            "Custom trigger using the expression language",
            vec![param(
                "dsl_expression",
                "string",
                None,
                "Expression to evaluate",
            )],
        ),
        TriggerType::CompositeTrigger => (
            "Combine multiple triggers with logical operators",
            vec![
                param("triggers", "array", None, "Child trigger configurations"),
                param("operator", "string", Some(json!("AND")), "AND, OR, NAND or NOR"),
            ],
        ),
    };
    TriggerTypeInfo {
        trigger_type,
        name: trigger_type.display_name(),
        description,
        params,
    }
}
