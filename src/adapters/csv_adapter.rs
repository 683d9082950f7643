//! CSV bar file adapter.
//!
//! Expects a header row followed by `timestamp,open,high,low,close,volume`
//! records. Timestamps are RFC 3339 or plain `YYYY-MM-DD` dates (midnight
//! UTC). Bars are replayed through a [`SnapshotBuilder`] in timestamp order.

use crate::domain::error::AlertEngineError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::snapshot::MarketSnapshot;
use crate::domain::snapshot_builder::SnapshotBuilder;
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::path::PathBuf;

pub struct CsvBarAdapter {
    path: PathBuf,
    symbol: String,
}

impl CsvBarAdapter {
    pub fn new(path: PathBuf, symbol: &str) -> Self {
        Self {
            path,
            symbol: symbol.to_string(),
        }
    }

    pub fn fetch_bars(&self) -> Result<Vec<OhlcvBar>, AlertEngineError> {
        let content = fs::read_to_string(&self.path).map_err(|e| AlertEngineError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        parse_bars(&content)
    }
}

impl MarketDataPort for CsvBarAdapter {
    fn snapshots(&self) -> Result<Vec<MarketSnapshot>, AlertEngineError> {
        let bars = self.fetch_bars()?;
        let mut builder = SnapshotBuilder::new(&self.symbol);
        Ok(builder.build_all(&bars))
    }
}

pub fn parse_bars(content: &str) -> Result<Vec<OhlcvBar>, AlertEngineError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let line = index + 2;
        let record = result.map_err(|e| AlertEngineError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;

        let column = |i: usize, name: &str| {
            record.get(i).ok_or_else(|| AlertEngineError::Data {
                reason: format!("line {}: missing {} column", line, name),
            })
        };
        let number = |i: usize, name: &str| -> Result<f64, AlertEngineError> {
            column(i, name)?
                .trim()
                .parse()
                .map_err(|e| AlertEngineError::Data {
                    reason: format!("line {}: invalid {} value: {}", line, name, e),
                })
        };

        let bar = OhlcvBar {
            timestamp: parse_timestamp(column(0, "timestamp")?).ok_or_else(|| {
                AlertEngineError::Data {
                    reason: format!("line {}: invalid timestamp format", line),
                }
            })?,
            open: number(1, "open")?,
            high: number(2, "high")?,
            low: number(3, "low")?,
            close: number(4, "close")?,
            volume: number(5, "volume")?,
        };
        if !bar.is_consistent() {
            return Err(AlertEngineError::Data {
                reason: format!("line {}: inconsistent bar", line),
            });
        }
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
