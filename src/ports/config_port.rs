//! Configuration access port trait.
//!
//! Lookups never fail: a missing or unparsable value yields the default.
//! Callers that need strictness validate raw strings first
//! (see `domain::config_validation`).

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
