//! Market snapshot: one consistent set of field values for a symbol.

use crate::domain::error::TriggerError;
use crate::domain::value::{Context, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Read-only field map handed to every trigger for one tick.
///
/// Backed by a JSON object so that arbitrary precomputed fields (`rsi`,
/// `bb_upper`, ...) pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketSnapshot {
    fields: Map<String, Json>,
}

/// The subset of a snapshot recorded with every fired event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub price: Option<f64>,
    pub volume: Option<f64>,
    pub symbol: String,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Json>) -> Self {
        Self { fields }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<Json>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Json>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Json> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &Map<String, Json> {
        &self.fields
    }

    /// Numeric field. Absent or `null` is `None`; any other non-number is an error.
    pub fn number(&self, field: &str) -> Result<Option<f64>, TriggerError> {
        match self.fields.get(field) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Number(n)) => Ok(n.as_f64()),
            Some(Json::Bool(b)) => Ok(Some(if *b { 1.0 } else { 0.0 })),
            Some(_) => Err(TriggerError::FieldType {
                field: field.to_string(),
                expected: "a number",
            }),
        }
    }

    pub fn number_or(&self, field: &str, default: f64) -> Result<f64, TriggerError> {
        Ok(self.number(field)?.unwrap_or(default))
    }

    /// Numeric series field (oldest first).
    pub fn series(&self, field: &str) -> Result<Option<Vec<f64>>, TriggerError> {
        match self.fields.get(field) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Array(items)) => items
                .iter()
                .map(Json::as_f64)
                .collect::<Option<Vec<f64>>>()
                .map(Some)
                .ok_or_else(|| TriggerError::FieldType {
                    field: field.to_string(),
                    expected: "a list of numbers",
                }),
            Some(_) => Err(TriggerError::FieldType {
                field: field.to_string(),
                expected: "a list of numbers",
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        self.fields
            .get("symbol")
            .and_then(Json::as_str)
            .unwrap_or("unknown")
    }

    /// Every field converted to an evaluator [`Value`].
    pub fn to_context(&self) -> Context {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            price: self.fields.get("price").and_then(Json::as_f64),
            volume: self.fields.get("volume").and_then(Json::as_f64),
            symbol: self.symbol().to_string(),
        }
    }
}

impl From<Map<String, Json>> for MarketSnapshot {
    fn from(fields: Map<String, Json>) -> Self {
        Self::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_from_object() {
        let snap: MarketSnapshot =
            serde_json::from_str(r#"{"price": 101.5, "symbol": "ETH", "prices": [1, 2, 3]}"#)
                .unwrap();
        assert_eq!(snap.number("price").unwrap(), Some(101.5));
        assert_eq!(snap.series("prices").unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(snap.symbol(), "ETH");
    }

    #[test]
    fn missing_fields_are_none() {
        let snap = MarketSnapshot::new();
        assert_eq!(snap.number("price").unwrap(), None);
        assert_eq!(snap.number_or("price", 0.0).unwrap(), 0.0);
        assert_eq!(snap.series("volumes").unwrap(), None);
        assert_eq!(snap.symbol(), "unknown");
    }

    #[test]
    fn mistyped_fields_are_errors() {
        let snap = MarketSnapshot::new()
            .with("price", "high")
            .with("prices", json!([1, "x"]));
        assert!(matches!(
            snap.number("price"),
            Err(TriggerError::FieldType { .. })
        ));
        assert!(snap.series("prices").is_err());
    }

    #[test]
    fn summary_and_context() {
        let snap = MarketSnapshot::new()
            .with("price", 10.0)
            .with("volume", 500.0)
            .with("rsi", 42.0);
        let summary = snap.summary();
        assert_eq!(summary.price, Some(10.0));
        assert_eq!(summary.symbol, "unknown");
        let ctx = snap.to_context();
        assert_eq!(ctx.get("rsi"), Some(&Value::Number(42.0)));
        assert_eq!(ctx.len(), 3);
    }
}
