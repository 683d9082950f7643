//! Port traits the engine talks to; implementations live in `adapters`.

pub mod alert_port;
pub mod config_port;
pub mod market_data_port;
pub mod notification_port;
