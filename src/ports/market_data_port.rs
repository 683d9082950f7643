//! Market data source port trait.

use crate::domain::error::AlertEngineError;
use crate::domain::snapshot::MarketSnapshot;

pub trait MarketDataPort {
    /// Snapshots in delivery order. Triggers are stateful, so the order matters.
    fn snapshots(&self) -> Result<Vec<MarketSnapshot>, AlertEngineError>;
}
