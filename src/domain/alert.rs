//! Alert definitions as stored by the alert repository.

use crate::domain::error::{AlertEngineError, ConfigError};
use crate::domain::trigger::{Trigger, TriggerConfig};
use crate::domain::trigger_factory::TriggerFactory;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Active,
    Paused,
    Triggered,
    Expired,
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

fn default_cooldown_minutes() -> u32 {
    5
}

fn default_max_daily_triggers() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default)]
    pub priority: AlertPriority,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_max_daily_triggers")]
    pub max_daily_triggers: u32,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u32,
}

impl Alert {
    pub fn new(id: &str, name: &str, symbol: &str, trigger: TriggerConfig) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            trigger,
            status: AlertStatus::default(),
            priority: AlertPriority::default(),
            cooldown_minutes: default_cooldown_minutes(),
            max_daily_triggers: default_max_daily_triggers(),
            valid_from: None,
            valid_until: None,
            last_triggered: None,
            trigger_count: 0,
        }
    }

    /// Whether a firing at `now` may be delivered: active status, inside the
    /// validity window, under the trigger cap and past the cooldown.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != AlertStatus::Active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        if self.trigger_count >= self.max_daily_triggers {
            return false;
        }
        match self.last_triggered {
            None => true,
            Some(last) => TimeDelta::try_minutes(i64::from(self.cooldown_minutes))
                .and_then(|cooldown| last.checked_add_signed(cooldown))
                .is_some_and(|cooldown_end| now >= cooldown_end),
        }
    }

    pub fn record_trigger(&mut self, now: DateTime<Utc>) {
        self.trigger_count = self.trigger_count.saturating_add(1);
        self.last_triggered = Some(now);
    }

    /// Build the alert's trigger, rejecting custom expressions that call
    /// functions the evaluator does not provide.
    pub fn validate(&self, factory: &TriggerFactory) -> Result<Trigger, AlertEngineError> {
        let trigger = factory.create(&self.trigger)?;
        check_expressions(&trigger, factory)?;
        Ok(trigger)
    }
}

fn check_expressions(trigger: &Trigger, factory: &TriggerFactory) -> Result<(), ConfigError> {
    if let Some(expression) = trigger.expression() {
        let validation = factory.evaluator().validate_expression(expression);
        if !validation.valid {
            return Err(ConfigError::InvalidParam {
                trigger_type: trigger.trigger_type().to_string(),
                param: "dsl_expression".to_string(),
                reason: validation.error.unwrap_or_default(),
            });
        }
    }
    trigger
        .children()
        .iter()
        .try_for_each(|child| check_expressions(child, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluator::Evaluator;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn alert() -> Alert {
        Alert::new(
            "a1",
            "BTC breakout",
            "BTC/USDT",
            TriggerConfig::new("price_above", json!({"threshold": 50000})),
        )
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn factory() -> TriggerFactory {
        TriggerFactory::new(Arc::new(Evaluator::default()))
    }

    #[test]
    fn deserializes_with_defaults() {
        let a: Alert = serde_json::from_value(json!({
            "id": "x",
            "name": "n",
            "symbol": "ETH/USDT",
            "trigger": {"type": "rsi_oversold", "params": {"threshold": 30}}
        }))
        .unwrap();
        assert_eq!(a.status, AlertStatus::Active);
        assert_eq!(a.priority, AlertPriority::Medium);
        assert_eq!(a.cooldown_minutes, 5);
        assert_eq!(a.max_daily_triggers, 10);
        assert_eq!(a.trigger_count, 0);
    }

    #[test]
    fn inactive_status_blocks() {
        let mut a = alert();
        a.status = AlertStatus::Paused;
        assert!(!a.is_active_at(t(12, 0)));
    }

    #[test]
    fn validity_window() {
        let mut a = alert();
        a.valid_from = Some(t(9, 0));
        a.valid_until = Some(t(17, 0));
        assert!(!a.is_active_at(t(8, 59)));
        assert!(a.is_active_at(t(9, 0)));
        assert!(a.is_active_at(t(17, 0)));
        assert!(!a.is_active_at(t(17, 1)));
    }

    #[test]
    fn cooldown_crosses_the_hour() {
        let mut a = alert();
        a.record_trigger(t(10, 58));
        assert!(!a.is_active_at(t(11, 2)));
        assert!(a.is_active_at(t(11, 3)));
        assert_eq!(a.trigger_count, 1);
    }

    #[test]
    fn trigger_cap() {
        let mut a = alert();
        a.max_daily_triggers = 2;
        a.cooldown_minutes = 0;
        a.record_trigger(t(10, 0));
        assert!(a.is_active_at(t(10, 0)));
        a.record_trigger(t(10, 0));
        assert!(!a.is_active_at(t(12, 0)));
    }

    #[test]
    fn validate_builds_trigger() {
        let trigger = alert().validate(&factory()).unwrap();
        assert_eq!(trigger.trigger_count(), 0);
    }

    #[test]
    fn validate_rejects_unknown_functions_in_children() {
        let mut a = alert();
        a.trigger = TriggerConfig::new(
            "composite_trigger",
            json!({"triggers": [
                {"type": "price_above", "params": {"threshold": 1}},
                {"type": "custom_dsl", "params": {"dsl_expression": "open('x') > 1"}}
            ]}),
        );
        let err = a.validate(&factory()).unwrap_err();
        assert!(err.to_string().contains("open"));
        assert!(matches!(
            err,
            AlertEngineError::Trigger(ConfigError::InvalidParam { .. })
        ));
    }

    #[test]
    fn validate_reports_bad_config() {
        let mut a = alert();
        a.trigger = TriggerConfig::new("price_above", json!({}));
        assert!(matches!(
            a.validate(&factory()),
            Err(AlertEngineError::Trigger(ConfigError::MissingParam { .. }))
        ));
    }
}
