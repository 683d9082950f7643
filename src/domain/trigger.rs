//! Stateful alert triggers.
//!
//! A [`Trigger`] is a predicate over market snapshots that may carry state
//! between ticks (crossover detectors, confirmation counters, cooldowns).
//! Triggers are built by [`TriggerFactory`](crate::domain::trigger_factory::TriggerFactory)
//! and assume exactly one `check` per snapshot, in snapshot order.
//!
//! # Check Semantics
//!
//! - `price_above` / `price_below`: level-triggered, refire every tick while true
//! - `volume_spike`: volume >= multiplier × mean of the last `lookback_period` volumes
//! - `rsi_overbought` / `rsi_oversold`: rsi strictly above / below threshold
//! - `bollinger_breakout`: fires after `confirmation_period` consecutive closes
//!   beyond the band, then resets its counter
//! - `macd_crossover`: fires when MACD crosses its signal line; the first tick
//!   only seeds state
//! - `scheduled_time`: wall-clock match plus a minimum interval between fires
//! - `composite_trigger`: checks every child, then combines
//! - `custom_dsl`: truthiness of an expression

use crate::domain::error::TriggerError;
use crate::domain::evaluator::Evaluator;
use crate::domain::expr::Expr;
use crate::domain::indicator;
use crate::domain::snapshot::MarketSnapshot;
use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Declarative trigger description: `{"type": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub params: Map<String, Json>,
}

impl TriggerConfig {
    pub fn new(trigger_type: impl Into<String>, params: Json) -> Self {
        let params = match params {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            trigger_type: trigger_type.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PriceAbove,
    PriceBelow,
    VolumeSpike,
    RsiOverbought,
    RsiOversold,
    BollingerBreakout,
    MacdCrossover,
    ScheduledTime,
    CustomDsl,
    CompositeTrigger,
}

impl TriggerType {
    pub const ALL: [TriggerType; 10] = [
        TriggerType::PriceAbove,
        TriggerType::PriceBelow,
        TriggerType::VolumeSpike,
        TriggerType::RsiOverbought,
        TriggerType::RsiOversold,
        TriggerType::BollingerBreakout,
        TriggerType::MacdCrossover,
        TriggerType::ScheduledTime,
        TriggerType::CustomDsl,
        TriggerType::CompositeTrigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::PriceAbove => "price_above",
            TriggerType::PriceBelow => "price_below",
            TriggerType::VolumeSpike => "volume_spike",
            TriggerType::RsiOverbought => "rsi_overbought",
            TriggerType::RsiOversold => "rsi_oversold",
            TriggerType::BollingerBreakout => "bollinger_breakout",
            TriggerType::MacdCrossover => "macd_crossover",
            TriggerType::ScheduledTime => "scheduled_time",
            TriggerType::CustomDsl => "custom_dsl",
            TriggerType::CompositeTrigger => "composite_trigger",
        }
    }

    /// Title-cased tag, e.g. "Price Above".
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// How a composite combines its children's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Nand,
    Nor,
}

impl Combinator {
    pub fn combine(&self, results: &[bool]) -> bool {
        let all = results.iter().all(|r| *r);
        let any = results.iter().any(|r| *r);
        match self {
            Combinator::And => all,
            Combinator::Or => any,
            Combinator::Nand => !all,
            Combinator::Nor => !any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
            Combinator::Nand => "NAND",
            Combinator::Nor => "NOR",
        }
    }
}

impl FromStr for Combinator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(Combinator::And),
            "OR" => Ok(Combinator::Or),
            "NAND" => Ok(Combinator::Nand),
            "NOR" => Ok(Combinator::Nor),
            _ => Err(format!("unknown operator '{}' (expected AND, OR, NAND or NOR)", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandEdge {
    Upper,
    Lower,
}

impl BandEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandEdge::Upper => "upper",
            BandEdge::Lower => "lower",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Bullish,
    Bearish,
}

impl CrossDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossDirection::Bullish => "bullish",
            CrossDirection::Bearish => "bearish",
        }
    }
}

/// Wall-clock condition of a scheduled trigger, evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Matches during the given hour and minute.
    SpecificTime(NaiveTime),
    /// Inclusive minute range; a start after the end wraps past midnight.
    TimeWindow(NaiveTime, NaiveTime),
    DayOfWeek(Weekday),
}

const TIME_FORMAT: &str = "%H:%M";

impl Schedule {
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        let minute_of_day = |t: NaiveTime| t.hour() * 60 + t.minute();
        let current = now.hour() * 60 + now.minute();
        match self {
            Schedule::SpecificTime(t) => current == minute_of_day(*t),
            Schedule::TimeWindow(start, end) => {
                let (start, end) = (minute_of_day(*start), minute_of_day(*end));
                if start <= end {
                    start <= current && current <= end
                } else {
                    current >= start || current <= end
                }
            }
            Schedule::DayOfWeek(day) => now.weekday() == *day,
        }
    }

    fn to_params(&self) -> (&'static str, Json) {
        match self {
            Schedule::SpecificTime(t) => ("specific_time", json!(t.format(TIME_FORMAT).to_string())),
            Schedule::TimeWindow(start, end) => (
                "time_window",
                json!([
                    start.format(TIME_FORMAT).to_string(),
                    end.format(TIME_FORMAT).to_string()
                ]),
            ),
            Schedule::DayOfWeek(day) => ("day_of_week", json!(day.num_days_from_monday())),
        }
    }
}

pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
}

#[derive(Debug, Clone)]
pub(crate) enum TriggerKind {
    PriceAbove {
        threshold: f64,
    },
    PriceBelow {
        threshold: f64,
    },
    VolumeSpike {
        multiplier: f64,
        lookback: usize,
    },
    Rsi {
        threshold: f64,
        overbought: bool,
    },
    BollingerBreakout {
        edge: BandEdge,
        confirmation_period: u32,
        confirmation_count: u32,
    },
    MacdCrossover {
        direction: CrossDirection,
        /// (macd, signal) seen on the previous tick.
        previous: Option<(f64, f64)>,
    },
    Scheduled {
        schedule: Schedule,
        min_interval: TimeDelta,
    },
    Custom {
        expression: String,
        tree: Arc<Expr>,
        evaluator: Arc<Evaluator>,
    },
    Composite {
        operator: Combinator,
        children: Vec<Trigger>,
    },
}

#[derive(Debug, Clone)]
pub struct Trigger {
    kind: TriggerKind,
    trigger_count: u64,
    last_triggered: Option<DateTime<Utc>>,
}

impl Trigger {
    pub(crate) fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            trigger_count: 0,
            last_triggered: None,
        }
    }

    pub fn trigger_type(&self) -> TriggerType {
        match &self.kind {
            TriggerKind::PriceAbove { .. } => TriggerType::PriceAbove,
            TriggerKind::PriceBelow { .. } => TriggerType::PriceBelow,
            TriggerKind::VolumeSpike { .. } => TriggerType::VolumeSpike,
            TriggerKind::Rsi {
                overbought: true, ..
            } => TriggerType::RsiOverbought,
            TriggerKind::Rsi { .. } => TriggerType::RsiOversold,
            TriggerKind::BollingerBreakout { .. } => TriggerType::BollingerBreakout,
            TriggerKind::MacdCrossover { .. } => TriggerType::MacdCrossover,
            TriggerKind::Scheduled { .. } => TriggerType::ScheduledTime,
            TriggerKind::Custom { .. } => TriggerType::CustomDsl,
            TriggerKind::Composite { .. } => TriggerType::CompositeTrigger,
        }
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }

    pub fn last_triggered(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
    }

    /// Expression text of a `custom_dsl` trigger.
    pub fn expression(&self) -> Option<&str> {
        match &self.kind {
            TriggerKind::Custom { expression, .. } => Some(expression),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Trigger] {
        match &self.kind {
            TriggerKind::Composite { children, .. } => children,
            _ => &[],
        }
    }

    pub fn check(&mut self, snapshot: &MarketSnapshot) -> Result<bool, TriggerError> {
        self.check_at(snapshot, Utc::now())
    }

    /// Check against `snapshot` with `now` as the wall clock.
    pub fn check_at(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool, TriggerError> {
        let fired = match &mut self.kind {
            TriggerKind::PriceAbove { threshold } => snapshot.number_or("price", 0.0)? > *threshold,
            TriggerKind::PriceBelow { threshold } => snapshot.number_or("price", 0.0)? < *threshold,
            TriggerKind::VolumeSpike {
                multiplier,
                lookback,
            } => {
                let volume = snapshot.number_or("volume", 0.0)?;
                let history = match snapshot.series("volumes")? {
                    Some(history) => history,
                    None => snapshot.series("volume_history")?.unwrap_or_default(),
                };
                if history.len() < *lookback {
                    false
                } else {
                    let window = &history[history.len() - *lookback..];
                    volume >= indicator::mean(window) * *multiplier
                }
            }
            TriggerKind::Rsi {
                threshold,
                overbought,
            } => {
                let rsi = snapshot.number_or("rsi", 50.0)?;
                if *overbought {
                    rsi > *threshold
                } else {
                    rsi < *threshold
                }
            }
            TriggerKind::BollingerBreakout {
                edge,
                confirmation_period,
                confirmation_count,
            } => {
                let price = snapshot.number_or("price", 0.0)?;
                let beyond = match edge {
                    BandEdge::Upper => price > snapshot.number_or("bb_upper", price * 1.1)?,
                    BandEdge::Lower => price < snapshot.number_or("bb_lower", price * 0.9)?,
                };
                if beyond {
                    *confirmation_count += 1;
                } else {
                    *confirmation_count = 0;
                }
                if *confirmation_count >= *confirmation_period {
                    *confirmation_count = 0;
                    true
                } else {
                    false
                }
            }
            TriggerKind::MacdCrossover {
                direction,
                previous,
            } => {
                let macd = snapshot.number_or("macd", 0.0)?;
                let signal = snapshot.number_or("macd_signal", 0.0)?;
                let crossed = match *previous {
                    None => false,
                    Some((prev_macd, prev_signal)) => match direction {
                        CrossDirection::Bullish => prev_macd <= prev_signal && macd > signal,
                        CrossDirection::Bearish => prev_macd >= prev_signal && macd < signal,
                    },
                };
                *previous = Some((macd, signal));
                crossed
            }
            TriggerKind::Scheduled {
                schedule,
                min_interval,
            } => {
                let cooled = self
                    .last_triggered
                    .is_none_or(|last| now - last >= *min_interval);
                schedule.matches(now) && cooled
            }
            TriggerKind::Custom {
                tree, evaluator, ..
            } => {
                let ctx = evaluator.build_context(snapshot);
                evaluator.evaluate(tree, &ctx)?.is_truthy()
            }
            TriggerKind::Composite { operator, children } => {
                let mut results = Vec::with_capacity(children.len());
                let mut first_error = None;
                for child in children.iter_mut() {
                    match child.check_at(snapshot, now) {
                        Ok(fired) => results.push(fired),
                        Err(err) => {
                            results.push(false);
                            first_error.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                operator.combine(&results)
            }
        };

        if fired {
            self.trigger_count += 1;
            self.last_triggered = Some(now);
        }
        Ok(fired)
    }

    /// Clear firing time and edge-detection state. `trigger_count` is kept.
    pub fn reset(&mut self) {
        self.last_triggered = None;
        match &mut self.kind {
            TriggerKind::BollingerBreakout {
                confirmation_count, ..
            } => *confirmation_count = 0,
            TriggerKind::MacdCrossover { previous, .. } => *previous = None,
            TriggerKind::Composite { children, .. } => children.iter_mut().for_each(Trigger::reset),
            _ => {}
        }
    }

    pub fn params(&self) -> Map<String, Json> {
        let params = match &self.kind {
            TriggerKind::PriceAbove { threshold } | TriggerKind::PriceBelow { threshold } => {
                json!({ "threshold": threshold })
            }
            TriggerKind::VolumeSpike {
                multiplier,
                lookback,
            } => json!({ "multiplier": multiplier, "lookback_period": lookback }),
            TriggerKind::Rsi { threshold, .. } => json!({ "threshold": threshold }),
            TriggerKind::BollingerBreakout {
                edge,
                confirmation_period,
                ..
            } => json!({
                "direction": edge.as_str(),
                "confirmation_period": confirmation_period,
            }),
            TriggerKind::MacdCrossover { direction, .. } => {
                json!({ "crossover_type": direction.as_str() })
            }
            TriggerKind::Scheduled {
                schedule,
                min_interval,
            } => {
                let (condition, value) = schedule.to_params();
                json!({
                    "condition": condition,
                    "value": value,
                    "min_interval_secs": min_interval.num_seconds(),
                })
            }
            TriggerKind::Custom { expression, .. } => json!({ "dsl_expression": expression }),
            TriggerKind::Composite { operator, children } => json!({
                "triggers": children.iter().map(Trigger::to_config).collect::<Vec<_>>(),
                "operator": operator.as_str(),
            }),
        };
        match params {
            Json::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn to_config(&self) -> TriggerConfig {
        TriggerConfig {
            trigger_type: self.trigger_type().as_str().to_string(),
            params: self.params(),
        }
    }
}
