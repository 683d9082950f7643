//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_alert_adapter;
pub mod json_lines_notifier;
pub mod json_snapshot_adapter;
