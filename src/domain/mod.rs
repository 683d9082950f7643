//! Core domain types and logic.

pub mod alert;
pub mod config_validation;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod expr_parser;
pub mod functions;
pub mod indicator;
pub mod metrics;
pub mod ohlcv;
pub mod settings;
pub mod snapshot;
pub mod snapshot_builder;
pub mod trigger;
pub mod trigger_factory;
pub mod trigger_manager;
pub mod value;
