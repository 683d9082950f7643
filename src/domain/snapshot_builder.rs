//! Rolling conversion of OHLCV bars into market snapshots.
//!
//! Each pushed bar yields a snapshot with the bar's own fields, trailing
//! windows and precomputed indicators:
//!
//! | field | source |
//! |---|---|
//! | `price`, `open`, `high`, `low`, `volume` | current bar |
//! | `prices`, `highs`, `lows` | trailing window, current bar last |
//! | `volumes` | trailing window of *previous* volumes |
//! | `rsi` | RSI(14) over `prices` |
//! | `macd`, `macd_signal`, `macd_histogram` | MACD(12, 26) line; signal is EMA(9) of the builder's MACD history |
//! | `bb_upper`, `bb_middle`, `bb_lower` | Bollinger(20, 2) |
//! | `sma_20`, `atr` | SMA(20), ATR(14) |
//!
//! `volumes` excludes the current bar so a volume spike is measured against
//! what came before it.

use crate::domain::indicator::{self, atr, bollinger, macd, rsi};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::snapshot::MarketSnapshot;
use serde_json::Value as Json;
use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 100;

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    symbol: String,
    window: usize,
    closes: VecDeque<f64>,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    volumes: VecDeque<f64>,
    macd_history: VecDeque<f64>,
    bars_seen: usize,
}

impl SnapshotBuilder {
    pub fn new(symbol: &str) -> Self {
        Self::with_window(symbol, DEFAULT_WINDOW)
    }

    /// The window never drops below what MACD needs for one signal value.
    pub fn with_window(symbol: &str, window: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            window: window.max(macd::DEFAULT_SLOW + macd::DEFAULT_SIGNAL),
            closes: VecDeque::new(),
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            volumes: VecDeque::new(),
            macd_history: VecDeque::new(),
            bars_seen: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Bars pushed so far, including those that left the window.
    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    pub fn window_len(&self) -> usize {
        self.closes.len()
    }

    pub fn push(&mut self, bar: &OhlcvBar) -> MarketSnapshot {
        let previous_volumes: Vec<f64> = self.volumes.iter().copied().collect();
        self.bars_seen += 1;

        push_bounded(&mut self.closes, bar.close, self.window);
        push_bounded(&mut self.highs, bar.high, self.window);
        push_bounded(&mut self.lows, bar.low, self.window);
        push_bounded(&mut self.volumes, bar.volume, self.window);

        let closes: Vec<f64> = self.closes.iter().copied().collect();
        let highs: Vec<f64> = self.highs.iter().copied().collect();
        let lows: Vec<f64> = self.lows.iter().copied().collect();

        let line = macd(
            &closes,
            macd::DEFAULT_FAST,
            macd::DEFAULT_SLOW,
            macd::DEFAULT_SIGNAL,
        )
        .macd;
        let (signal, histogram) = if closes.len() >= macd::DEFAULT_SLOW {
            push_bounded(&mut self.macd_history, line, self.window);
            let history: Vec<f64> = self.macd_history.iter().copied().collect();
            let signal = indicator::ema(&history, macd::DEFAULT_SIGNAL);
            (signal, line - signal)
        } else {
            (0.0, 0.0)
        };

        let bands = bollinger(
            &closes,
            bollinger::DEFAULT_PERIOD,
            bollinger::DEFAULT_MULTIPLIER,
        );

        MarketSnapshot::new()
            .with("symbol", self.symbol.as_str())
            .with("timestamp", bar.timestamp.to_rfc3339())
            .with("price", bar.close)
            .with("open", bar.open)
            .with("high", bar.high)
            .with("low", bar.low)
            .with("volume", bar.volume)
            .with("prices", series(&closes))
            .with("highs", series(&highs))
            .with("lows", series(&lows))
            .with("volumes", series(&previous_volumes))
            .with("rsi", rsi(&closes, rsi::DEFAULT_PERIOD))
            .with("macd", line)
            .with("macd_signal", signal)
            .with("macd_histogram", histogram)
            .with("bb_upper", bands.upper)
            .with("bb_middle", bands.middle)
            .with("bb_lower", bands.lower)
            .with("sma_20", indicator::sma(&closes, 20))
            .with("atr", atr(&highs, &lows, &closes, atr::DEFAULT_PERIOD))
    }

    /// Convert a whole bar sequence, in order.
    pub fn build_all(&mut self, bars: &[OhlcvBar]) -> Vec<MarketSnapshot> {
        bars.iter().map(|bar| self.push(bar)).collect()
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, capacity: usize) {
    if buffer.len() == capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

fn series(values: &[f64]) -> Json {
    Json::Array(values.iter().map(|&v| Json::from(v)).collect())
}
