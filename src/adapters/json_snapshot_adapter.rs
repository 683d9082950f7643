//! JSON-lines snapshot adapter: one snapshot object per line.

use crate::domain::error::AlertEngineError;
use crate::domain::snapshot::MarketSnapshot;
use crate::ports::market_data_port::MarketDataPort;
use std::fs;
use std::path::PathBuf;

pub struct JsonSnapshotAdapter {
    path: PathBuf,
}

impl JsonSnapshotAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MarketDataPort for JsonSnapshotAdapter {
    fn snapshots(&self) -> Result<Vec<MarketSnapshot>, AlertEngineError> {
        let content = fs::read_to_string(&self.path).map_err(|e| AlertEngineError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        parse_snapshots(&content)
    }
}

/// Blank lines are skipped; any other line must be a JSON object.
pub fn parse_snapshots(content: &str) -> Result<Vec<MarketSnapshot>, AlertEngineError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| AlertEngineError::Data {
                reason: format!("line {}: invalid snapshot: {}", index + 1, e),
            })
        })
        .collect()
}
