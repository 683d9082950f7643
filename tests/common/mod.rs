#![allow(dead_code)]

use alertengine::domain::alert::Alert;
use alertengine::domain::error::AlertEngineError;
use alertengine::domain::evaluator::Evaluator;
pub use alertengine::domain::ohlcv::OhlcvBar;
use alertengine::domain::snapshot::MarketSnapshot;
use alertengine::domain::trigger::TriggerConfig;
use alertengine::domain::trigger_factory::TriggerFactory;
use alertengine::domain::trigger_manager::{FiredEvent, TriggerManager};
use alertengine::ports::alert_port::AlertRepository;
use alertengine::ports::market_data_port::MarketDataPort;
use alertengine::ports::notification_port::NotificationPort;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{json, Value as Json};
use std::sync::Arc;

pub struct MockAlertRepository {
    pub alerts: Vec<Alert>,
    pub error: Option<String>,
}

impl MockAlertRepository {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self {
            alerts,
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            alerts: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl AlertRepository for MockAlertRepository {
    fn load_alerts(&self) -> Result<Vec<Alert>, AlertEngineError> {
        match &self.error {
            Some(reason) => Err(AlertEngineError::Repository {
                reason: reason.clone(),
            }),
            None => Ok(self.alerts.clone()),
        }
    }
}

pub struct MockMarketData {
    pub snapshots: Vec<MarketSnapshot>,
}

impl MarketDataPort for MockMarketData {
    fn snapshots(&self) -> Result<Vec<MarketSnapshot>, AlertEngineError> {
        Ok(self.snapshots.clone())
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    pub events: Vec<FiredEvent>,
}

impl NotificationPort for CollectingNotifier {
    fn dispatch(&mut self, event: &FiredEvent) -> Result<(), AlertEngineError> {
        self.events.push(event.clone());
        Ok(())
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// One bar per minute from [`start_time`], open = close, range of ±1.
pub fn bars_from_closes(closes: &[f64], volume: f64) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp: start_time() + TimeDelta::minutes(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        })
        .collect()
}

pub fn price_snapshot(symbol: &str, price: f64) -> MarketSnapshot {
    MarketSnapshot::new().with("symbol", symbol).with("price", price)
}

pub fn config(trigger_type: &str, params: Json) -> TriggerConfig {
    TriggerConfig::new(trigger_type, params)
}

pub fn price_above(threshold: f64) -> TriggerConfig {
    config("price_above", json!({ "threshold": threshold }))
}

pub fn manager() -> TriggerManager {
    TriggerManager::new(TriggerFactory::new(Arc::new(Evaluator::default())))
}

pub fn alert(id: &str, symbol: &str, trigger: TriggerConfig) -> Alert {
    Alert::new(id, id, symbol, trigger)
}
