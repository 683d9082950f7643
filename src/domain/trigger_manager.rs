//! Trigger registry and per-tick evaluation loop.

use crate::domain::error::ConfigError;
use crate::domain::snapshot::{MarketSnapshot, SnapshotSummary};
use crate::domain::trigger::{Trigger, TriggerConfig, TriggerType};
use crate::domain::trigger_factory::{TriggerFactory, TriggerTypeInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Number of events reported by [`TriggerStats::recent_triggers`].
const RECENT_EVENTS: usize = 10;

/// Record of one trigger firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub trigger_id: String,
    pub trigger_type: TriggerType,
    pub params: Map<String, Json>,
    #[serde(rename = "market_data_snapshot")]
    pub snapshot: SnapshotSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerStats {
    pub total_triggers: usize,
    pub trigger_counts: BTreeMap<String, u64>,
    pub trigger_types: BTreeMap<TriggerType, usize>,
    pub recent_triggers: Vec<FiredEvent>,
}

/// Owns registered triggers by id and a bounded FIFO of fired events.
///
/// Iteration is in id order. Triggers are stateful, so a manager must see
/// each snapshot exactly once and in order.
#[derive(Debug)]
pub struct TriggerManager {
    factory: TriggerFactory,
    triggers: BTreeMap<String, Trigger>,
    history: VecDeque<FiredEvent>,
    capacity: usize,
}

impl TriggerManager {
    pub fn new(factory: TriggerFactory) -> Self {
        Self {
            factory,
            triggers: BTreeMap::new(),
            history: VecDeque::new(),
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Capacity is clamped to at least one event.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn factory(&self) -> &TriggerFactory {
        &self.factory
    }

    /// Build and register a trigger. An existing id is replaced.
    pub fn add(&mut self, id: &str, config: &TriggerConfig) -> Result<&Trigger, ConfigError> {
        let trigger = self.factory.create(config)?;
        Ok(self.insert(id, trigger))
    }

    /// Register a trigger that was already built, e.g. during alert validation.
    pub fn insert(&mut self, id: &str, trigger: Trigger) -> &Trigger {
        info!(trigger_id = id, trigger_type = %trigger.trigger_type(), "trigger added");
        self.triggers.insert(id.to_string(), trigger);
        &self.triggers[id]
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.triggers.remove(id).is_some();
        if removed {
            info!(trigger_id = id, "trigger removed");
        }
        removed
    }

    /// Clear a trigger's firing time and edge state.
    pub fn reset(&mut self, id: &str) -> bool {
        match self.triggers.get_mut(id) {
            Some(trigger) => {
                trigger.reset();
                info!(trigger_id = id, "trigger reset");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Trigger> {
        self.triggers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn check_all(&mut self, snapshot: &MarketSnapshot) -> Vec<FiredEvent> {
        self.check_all_at(snapshot, Utc::now())
    }

    /// Check every trigger once. A trigger whose check fails is logged and
    /// counted as not fired; the rest of the batch still runs.
    pub fn check_all_at(&mut self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Vec<FiredEvent> {
        let mut fired = Vec::new();
        for (id, trigger) in self.triggers.iter_mut() {
            match trigger.check_at(snapshot, now) {
                Ok(true) => {
                    debug!(trigger_id = %id, trigger_type = %trigger.trigger_type(), "trigger fired");
                    fired.push(FiredEvent {
                        trigger_id: id.clone(),
                        trigger_type: trigger.trigger_type(),
                        params: trigger.params(),
                        snapshot: snapshot.summary(),
                        timestamp: now,
                    });
                }
                Ok(false) => {}
                Err(err) => warn!(trigger_id = %id, error = %err, "error checking trigger"),
            }
        }

        for event in &fired {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());
        }
        fired
    }

    /// Fired events, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &FiredEvent> {
        self.history.iter()
    }

    pub fn stats(&self) -> TriggerStats {
        let mut trigger_types = BTreeMap::new();
        for trigger in self.triggers.values() {
            *trigger_types.entry(trigger.trigger_type()).or_insert(0) += 1;
        }
        let skip = self.history.len().saturating_sub(RECENT_EVENTS);
        TriggerStats {
            total_triggers: self.triggers.len(),
            trigger_counts: self
                .triggers
                .iter()
                .map(|(id, t)| (id.clone(), t.trigger_count()))
                .collect(),
            trigger_types,
            recent_triggers: self.history.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn supported_trigger_types(&self) -> Vec<TriggerTypeInfo> {
        self.factory.supported_trigger_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluator::Evaluator;
    use chrono::TimeDelta;
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> TriggerManager {
        TriggerManager::new(TriggerFactory::new(Arc::new(Evaluator::default())))
    }

    fn above(threshold: f64) -> TriggerConfig {
        TriggerConfig::new("price_above", json!({ "threshold": threshold }))
    }

    fn price(p: f64) -> MarketSnapshot {
        MarketSnapshot::new().with("price", p).with("symbol", "BTC/USDT")
    }

    #[test]
    fn insert_prebuilt_trigger() {
        let mut m = manager();
        let built = m.factory().create(&above(1.0)).unwrap();
        m.insert("pre", built);
        assert_eq!(m.len(), 1);
        let events = m.check_all(&MarketSnapshot::new().with("price", 2.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger_id, "pre");
    }

    #[test]
    fn add_remove_and_overwrite() {
        let mut m = manager();
        m.add("a", &above(1.0)).unwrap();
        m.add("a", &TriggerConfig::new("price_below", json!({"threshold": 1}))).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("a").unwrap().trigger_type(), TriggerType::PriceBelow);
        assert!(m.remove("a"));
        assert!(!m.remove("a"));
        assert!(m.is_empty());
    }

    #[test]
    fn add_rejects_bad_config() {
        let mut m = manager();
        assert!(m.add("bad", &TriggerConfig::new("nope", json!({}))).is_err());
        assert!(m.is_empty());
    }

    #[test]
    fn fired_event_contents() {
        let mut m = manager();
        m.add("btc-100", &above(100.0)).unwrap();
        let events = m.check_all(&price(150.0).with("volume", 12.0));
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.trigger_id, "btc-100");
        assert_eq!(event.trigger_type, TriggerType::PriceAbove);
        assert_eq!(event.params["threshold"], json!(100.0));
        assert_eq!(event.snapshot.symbol, "BTC/USDT");
        assert_eq!(event.snapshot.volume, Some(12.0));
        let rendered = serde_json::to_value(event).unwrap();
        assert_eq!(rendered["market_data_snapshot"]["price"], json!(150.0));
        assert_eq!(rendered["trigger_type"], json!("price_above"));
    }

    #[test]
    fn failing_trigger_is_isolated() {
        let mut m = manager();
        m.add(
            "broken",
            &TriggerConfig::new("custom_dsl", json!({"dsl_expression": "sqrt(-1) > 0"})),
        )
        .unwrap();
        m.add("ok", &above(10.0)).unwrap();
        let events = m.check_all(&price(20.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger_id, "ok");
        assert_eq!(m.stats().trigger_counts["broken"], 0);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut m = manager();
        m.add("t", &above(0.0)).unwrap();
        let start = Utc::now();
        for i in 0..1050 {
            m.check_all_at(&price(1.0), start + TimeDelta::seconds(i));
        }
        assert_eq!(m.history().len(), DEFAULT_HISTORY_CAPACITY);
        let oldest = m.history().next().unwrap();
        assert_eq!(oldest.timestamp, start + TimeDelta::seconds(50));
        assert_eq!(m.get("t").unwrap().trigger_count(), 1050);
    }

    #[test]
    fn custom_capacity() {
        let mut m = manager().with_history_capacity(0);
        m.add("t", &above(0.0)).unwrap();
        m.check_all(&price(1.0));
        m.check_all(&price(2.0));
        assert_eq!(m.history().len(), 1);
        assert_eq!(m.history().next().unwrap().snapshot.price, Some(2.0));
    }

    #[test]
    fn stats_counts_and_recent() {
        let mut m = manager();
        m.add("a", &above(0.0)).unwrap();
        m.add("b", &above(0.0)).unwrap();
        m.add("c", &TriggerConfig::new("rsi_oversold", json!({"threshold": 30}))).unwrap();
        for _ in 0..7 {
            m.check_all(&price(1.0));
        }
        let stats = m.stats();
        assert_eq!(stats.total_triggers, 3);
        assert_eq!(stats.trigger_counts["a"], 7);
        assert_eq!(stats.trigger_counts["c"], 0);
        assert_eq!(stats.trigger_types[&TriggerType::PriceAbove], 2);
        assert_eq!(stats.trigger_types[&TriggerType::RsiOversold], 1);
        assert_eq!(stats.recent_triggers.len(), 10);
        let rendered = serde_json::to_value(&stats).unwrap();
        assert_eq!(rendered["trigger_types"]["price_above"], json!(2));
    }

    #[test]
    fn reset_by_id() {
        let mut m = manager();
        m.add("t", &above(0.0)).unwrap();
        m.check_all(&price(1.0));
        assert!(m.get("t").unwrap().last_triggered().is_some());
        assert!(m.reset("t"));
        assert!(m.get("t").unwrap().last_triggered().is_none());
        assert!(!m.reset("missing"));
    }

    #[test]
    fn iteration_order_is_stable() {
        let mut m = manager();
        for id in ["c", "a", "b"] {
            m.add(id, &above(0.0)).unwrap();
        }
        let ids: Vec<&str> = m.ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let fired: Vec<String> = m
            .check_all(&price(1.0))
            .into_iter()
            .map(|e| e.trigger_id)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
    }
}
