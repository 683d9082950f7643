//! Alert repository backed by a JSON array file.

use crate::domain::alert::Alert;
use crate::domain::error::AlertEngineError;
use crate::ports::alert_port::AlertRepository;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

pub struct JsonAlertAdapter {
    path: PathBuf,
}

impl JsonAlertAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AlertRepository for JsonAlertAdapter {
    fn load_alerts(&self) -> Result<Vec<Alert>, AlertEngineError> {
        let content = fs::read_to_string(&self.path).map_err(|e| AlertEngineError::Repository {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        parse_alerts(&content)
    }
}

/// Alert ids key the trigger registry, so duplicates are rejected here.
pub fn parse_alerts(content: &str) -> Result<Vec<Alert>, AlertEngineError> {
    let alerts: Vec<Alert> =
        serde_json::from_str(content).map_err(|e| AlertEngineError::Repository {
            reason: format!("invalid alert file: {}", e),
        })?;
    let mut seen = HashSet::new();
    for alert in &alerts {
        if !seen.insert(alert.id.as_str()) {
            return Err(AlertEngineError::Repository {
                reason: format!("duplicate alert id '{}'", alert.id),
            });
        }
    }
    Ok(alerts)
}
