//! alertengine: market alert expressions and stateful triggers.
//!
//! Hexagonal architecture: the expression evaluator, indicator library and
//! trigger framework live in [`domain`], port traits in [`ports`], concrete
//! implementations in [`adapters`], and the command line in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
